//! `time` package import resolution

use regbench_core::GoFile;

/// Import path of the package providing `Now`, `Since`, `Sleep` and `Duration`
pub const TIME_PACKAGE: &str = "time";

/// How injected code refers to the `time` package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeImport {
    /// Prefix for package members: `time.`, `t.`, or empty for a dot import
    pub qualifier: String,
    /// Whether an `import "time"` declaration must be added
    pub missing: bool,
}

impl TimeImport {
    /// Inspect the imports of a file
    pub fn resolve(file: &GoFile) -> Self {
        let existing = file
            .imports()
            .into_iter()
            .filter(|spec| spec.path == TIME_PACKAGE)
            .find(|spec| spec.alias.as_deref() != Some("_"));

        match existing {
            Some(spec) => {
                let qualifier = match spec.alias.as_deref() {
                    Some(".") => String::new(),
                    Some(alias) => format!("{alias}."),
                    None => format!("{TIME_PACKAGE}."),
                };
                Self {
                    qualifier,
                    missing: false,
                }
            }
            None => Self {
                qualifier: format!("{TIME_PACKAGE}."),
                missing: true,
            },
        }
    }

    /// Declaration to insert after the package clause
    pub fn declaration() -> String {
        format!("\n\nimport \"{TIME_PACKAGE}\"")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(src: &str) -> TimeImport {
        TimeImport::resolve(&GoFile::parse(src).unwrap())
    }

    #[test]
    fn plain_import() {
        let t = resolve("package p\n\nimport \"time\"\n");
        assert_eq!(t.qualifier, "time.");
        assert!(!t.missing);
    }

    #[test]
    fn aliased_import_in_group() {
        let t = resolve("package p\n\nimport (\n\t\"fmt\"\n\tclock \"time\"\n)\n");
        assert_eq!(t.qualifier, "clock.");
        assert!(!t.missing);
    }

    #[test]
    fn dot_import() {
        let t = resolve("package p\n\nimport . \"time\"\n");
        assert_eq!(t.qualifier, "");
        assert!(!t.missing);
    }

    #[test]
    fn blank_import_does_not_count() {
        let t = resolve("package p\n\nimport _ \"time\"\n");
        assert_eq!(t.qualifier, "time.");
        assert!(t.missing);
    }

    #[test]
    fn no_import() {
        let t = resolve("package p\n\nimport \"fmt\"\n");
        assert!(t.missing);
    }
}
