pub const ACC_PUBLIC: u32 = 0x0001; // class, field, method, ic
pub const ACC_PRIVATE: u32 = 0x0002; // field, method, ic
pub const ACC_PROTECTED: u32 = 0x0004; // field, method, ic
pub const ACC_STATIC: u32 = 0x0008; // field, method, ic
pub const ACC_FINAL: u32 = 0x0010; // class, field, method, ic
pub const ACC_SYNCHRONIZED: u32 = 0x0020; // method (only allowed on natives)
pub const ACC_VOLATILE: u32 = 0x0040; // field
pub const ACC_BRIDGE: u32 = 0x0040; // method (1.5)
pub const ACC_TRANSIENT: u32 = 0x0080; // field
pub const ACC_VARARGS: u32 = 0x0080; // method (1.5)
pub const ACC_NATIVE: u32 = 0x0100; // method
pub const ACC_INTERFACE: u32 = 0x0200; // class, ic
pub const ACC_ABSTRACT: u32 = 0x0400; // class, method, ic
pub const ACC_STRICT: u32 = 0x0800; // method
pub const ACC_SYNTHETIC: u32 = 0x1000; // class, field, method, ic
pub const ACC_ANNOTATION: u32 = 0x2000; // class, ic (1.5)
pub const ACC_ENUM: u32 = 0x4000; // class, field, ic (1.5)

pub const ACC_CONSTRUCTOR: u32 = 0x00010000; // method (dex only) <(cl)init>
pub const ACC_DECLARED_SYNCHRONIZED: u32 = 0x00020000; // method (dex only)

/// What an access flag word belongs to; a few bits mean different things
/// on fields and methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagTarget {
    Class,
    Field,
    Method,
}

const COMMON_FLAGS: &[(u32, &str)] = &[
    (ACC_PUBLIC, "public"),
    (ACC_PRIVATE, "private"),
    (ACC_PROTECTED, "protected"),
    (ACC_STATIC, "static"),
    (ACC_FINAL, "final"),
];

const CLASS_FLAGS: &[(u32, &str)] = &[
    (ACC_INTERFACE, "interface"),
    (ACC_ABSTRACT, "abstract"),
    (ACC_SYNTHETIC, "synthetic"),
    (ACC_ANNOTATION, "annotation"),
    (ACC_ENUM, "enum"),
];

const FIELD_FLAGS: &[(u32, &str)] = &[
    (ACC_VOLATILE, "volatile"),
    (ACC_TRANSIENT, "transient"),
    (ACC_SYNTHETIC, "synthetic"),
    (ACC_ENUM, "enum"),
];

const METHOD_FLAGS: &[(u32, &str)] = &[
    (ACC_SYNCHRONIZED, "synchronized"),
    (ACC_BRIDGE, "bridge"),
    (ACC_VARARGS, "varargs"),
    (ACC_NATIVE, "native"),
    (ACC_ABSTRACT, "abstract"),
    (ACC_STRICT, "strictfp"),
    (ACC_SYNTHETIC, "synthetic"),
    (ACC_CONSTRUCTOR, "constructor"),
    (ACC_DECLARED_SYNCHRONIZED, "declared-synchronized"),
];

/// Renders `flags` as space separated Java-style modifiers.
pub fn describe_flags(flags: u32, target: FlagTarget) -> String {
    let specific = match target {
        FlagTarget::Class => CLASS_FLAGS,
        FlagTarget::Field => FIELD_FLAGS,
        FlagTarget::Method => METHOD_FLAGS,
    };
    COMMON_FLAGS
        .iter()
        .chain(specific)
        .filter(|(bit, _)| flags & bit != 0)
        .map(|(_, name)| *name)
        .collect::<Vec<_>>()
        .join(" ")
}
