use serde::Serialize;

pub const KEY_TEST: &str = "TEST";
pub const KEY_FSDB: &str = "FSDB";
pub const KEY_COMPILE: &str = "COMPILE";
pub const KEY_SIMARGS: &str = "SIMARGS";
pub const KEY_DBG: &str = "DBG";
pub const KEY_CLEAN: &str = "CLEAN";
pub const KEY_GUI: &str = "GUI";

pub const DEFAULT_TEST: &str = "basic";
pub const DEFAULT_SIMARGS: &str = "+UVM_NO_RELNOTES";

/// Resolved parameters for one test execution.
///
/// Built once from defaults plus `KEY=VALUE` overrides and never mutated afterwards;
/// callers that need a variant build a new value with struct update syntax.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunConfig {
    pub test: String,
    pub fsdb: bool,
    pub compile: bool,
    pub simargs: String,
    pub dbg: u32,
    pub clean: bool,
    pub gui: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            test: DEFAULT_TEST.to_string(),
            fsdb: false,
            compile: true,
            simargs: DEFAULT_SIMARGS.to_string(),
            dbg: 0,
            clean: false,
            gui: false,
        }
    }
}

impl RunConfig {
    /// Merges `KEY=VALUE` tokens over the defaults. Later tokens win.
    ///
    /// Tokens without exactly one `=` and unknown keys are skipped. This never fails.
    pub fn resolve<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = RunConfig::default();
        for token in tokens {
            let Some((key, value)) = split_override(token.as_ref()) else {
                tracing::debug!("ignoring malformed override {:?}", token.as_ref());
                continue;
            };
            match key {
                KEY_TEST => out.test = value.to_string(),
                KEY_FSDB => out.fsdb = parse_flag(value),
                KEY_COMPILE => out.compile = parse_compile_flag(value),
                KEY_SIMARGS => out.simargs = value.to_string(),
                KEY_DBG => out.dbg = value.trim().parse().unwrap_or(0),
                KEY_CLEAN => out.clean = parse_flag(value),
                KEY_GUI => out.gui = parse_flag(value),
                _ => tracing::debug!("ignoring unknown override key {key:?}"),
            }
        }
        out
    }

    /// Whitespace-splitting convenience for a single argument string such as
    /// `"TEST=smoke COMPILE=0"`.
    pub fn resolve_str(args: &str) -> Self {
        Self::resolve(args.split_whitespace())
    }

    /// Renders the override tokens that reproduce the non-default parts of this config,
    /// in the fixed key order. Used for progress lines and reports.
    pub fn to_tokens(&self) -> Vec<String> {
        let def = RunConfig::default();
        let mut out = vec![format!("{KEY_TEST}={}", self.test)];
        if self.fsdb != def.fsdb {
            out.push(format!("{KEY_FSDB}={}", flag_str(self.fsdb)));
        }
        if self.compile != def.compile {
            out.push(format!("{KEY_COMPILE}={}", flag_str(self.compile)));
        }
        if self.simargs != def.simargs {
            out.push(format!("{KEY_SIMARGS}={}", self.simargs));
        }
        if self.dbg != def.dbg {
            out.push(format!("{KEY_DBG}={}", self.dbg));
        }
        if self.clean != def.clean {
            out.push(format!("{KEY_CLEAN}={}", flag_str(self.clean)));
        }
        if self.gui != def.gui {
            out.push(format!("{KEY_GUI}={}", flag_str(self.gui)));
        }
        out
    }
}

fn split_override(token: &str) -> Option<(&str, &str)> {
    let (key, value) = token.split_once('=')?;
    if value.contains('=') {
        return None;
    }
    Some((key, value))
}

fn parse_flag(value: &str) -> bool {
    !matches!(value, "" | "0" | "False" | "false")
}

/// `COMPILE` is off only for the exact spellings `0` and `False`; even an empty value compiles.
fn parse_compile_flag(value: &str) -> bool {
    !matches!(value, "0" | "False")
}

fn flag_str(v: bool) -> &'static str {
    if v {
        "1"
    } else {
        "0"
    }
}

/// Test ids end up in paths and shell strings, so only a conservative alphabet is allowed.
pub fn validate_test_id(id: &str) -> anyhow::Result<()> {
    if id.is_empty() {
        anyhow::bail!("test id is empty");
    }
    if let Some(c) = id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        anyhow::bail!("invalid test id {id:?}: character {c:?} is not allowed (expected [A-Za-z0-9._-])");
    }
    if id == "." || id == ".." {
        anyhow::bail!("invalid test id {id:?}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_tokens_yields_defaults() {
        let cfg = RunConfig::resolve(Vec::<String>::new());
        assert_eq!(cfg, RunConfig::default());
        assert_eq!(cfg.test, "basic");
        assert!(cfg.compile);
        assert!(!cfg.fsdb);
        assert_eq!(cfg.simargs, "+UVM_NO_RELNOTES");
        assert_eq!(cfg.dbg, 0);
    }

    #[test]
    fn overrides_apply_and_later_tokens_win() {
        let cfg = RunConfig::resolve([
            "TEST=first",
            "FSDB=1",
            "DBG=300",
            "TEST=second",
            "GUI=True",
            "CLEAN=yes",
            "SIMARGS=+foo",
        ]);
        assert_eq!(cfg.test, "second");
        assert!(cfg.fsdb);
        assert!(cfg.gui);
        assert!(cfg.clean);
        assert_eq!(cfg.dbg, 300);
        assert_eq!(cfg.simargs, "+foo");
    }

    #[test]
    fn compile_is_disabled_only_by_0_and_capital_false() {
        for v in ["0", "False"] {
            let cfg = RunConfig::resolve([format!("COMPILE={v}")]);
            assert!(!cfg.compile, "COMPILE={v:?} should disable compile");
        }
        for v in ["1", "True", "false", "FALSE", "", "no", "yes"] {
            let cfg = RunConfig::resolve([format!("COMPILE={v}")]);
            assert!(cfg.compile, "COMPILE={v:?} should enable compile");
        }
    }

    #[test]
    fn other_flags_treat_lowercase_false_and_empty_as_off() {
        let cfg = RunConfig::resolve(["FSDB=false", "CLEAN=", "GUI=0"]);
        assert!(!cfg.fsdb);
        assert!(!cfg.clean);
        assert!(!cfg.gui);
    }

    #[test]
    fn malformed_and_unknown_tokens_are_ignored() {
        let cfg = RunConfig::resolve([
            "/usr/bin/hawk",
            "TEST",
            "SIMARGS=+a=b",
            "BOGUS=1",
            "test=lowercase",
            "DBG=-4",
            "DBG=abc",
        ]);
        assert_eq!(cfg, RunConfig::default());
    }

    #[test]
    fn resolve_str_splits_on_whitespace() {
        let cfg = RunConfig::resolve_str("TEST=smoke   COMPILE=0");
        assert_eq!(cfg.test, "smoke");
        assert!(!cfg.compile);
    }

    #[test]
    fn tokens_describe_non_default_fields() {
        let cfg = RunConfig {
            test: "b".to_string(),
            compile: false,
            ..RunConfig::default()
        };
        assert_eq!(cfg.to_tokens(), vec!["TEST=b", "COMPILE=0"]);
        assert_eq!(RunConfig::resolve(cfg.to_tokens()), cfg);
    }

    #[test]
    fn test_id_validation() {
        validate_test_id("smoke_01.v2-x").unwrap();
        assert!(validate_test_id("").is_err());
        assert!(validate_test_id("a b").is_err());
        assert!(validate_test_id("a/b").is_err());
        assert!(validate_test_id("..").is_err());
        assert!(validate_test_id("x\"y").is_err());
    }
}
