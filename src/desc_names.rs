use crate::file::Prototype;

/// Converts a type descriptor into its Java source form, e.g.
/// `[Ljava/lang/String;` becomes `java.lang.String[]`.
pub fn pretty_desc(desc: &str) -> String {
    let dim = desc.chars().take_while(|c| *c == '[').count();
    let name = &desc[dim..];
    let mut output = String::new();

    if let Some(class) = name.strip_prefix('L') {
        let class = class.strip_suffix(';').unwrap_or(class);
        output.push_str(&class.replace('/', "."));
    } else {
        output.push_str(match name.as_bytes().first() {
            Some(b'B') => "byte",
            Some(b'C') => "char",
            Some(b'D') => "double",
            Some(b'F') => "float",
            Some(b'I') => "int",
            Some(b'J') => "long",
            Some(b'S') => "short",
            Some(b'Z') => "boolean",
            Some(b'V') => "void",
            _ => name,
        });
    }

    if dim > 0 {
        output.push_str(&"[]".repeat(dim));
    }
    output
}

/// Java-style signature of a method named `name`, e.g.
/// `void main(java.lang.String[])`.
pub fn pretty_method(name: &str, proto: &Prototype) -> String {
    let params = proto
        .parameters
        .iter()
        .map(|p| pretty_desc(p))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{} {}({})", pretty_desc(&proto.return_type), name, params)
}
