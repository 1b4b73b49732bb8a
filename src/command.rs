//! Assembly of sqlmap command lines.
//!
//! This module turns the option catalogue plus a set of current values into
//! the literal argument vector handed to the supervisor. Options equal to
//! their catalogue default are never emitted; the `--technique` letter group
//! is folded into a single token with set-comparison semantics.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::catalog::{Catalog, OptionSpec, OptionValue, ValueSet};
use crate::config::ToolConfig;

/// Flags that designate where the scan target comes from.
const TARGET_FLAGS: [&str; 7] = ["-u", "-d", "-l", "-m", "-r", "-g", "-c"];

/// Flags that drop sqlmap into an interactive prompt and therefore work
/// poorly without `--batch` when output is captured.
pub const INTERACTIVE_FLAGS: [&str; 5] = [
    "--sql-shell",
    "--os-shell",
    "--os-pwn",
    "--wizard",
    "--shell",
];

/// Error raised by the pre-flight check before any assembly happens.
#[derive(thiserror::Error, Debug)]
pub enum AssembleError {
    #[error("sqlmap path is not configured")]
    PathNotSet,
    #[error("'{0}' was not found on disk or in PATH")]
    ExecutableNotFound(String),
    #[error("sqlmap path is not valid shell syntax: {0}")]
    InvalidInvocation(String),
}

/// An assembled sqlmap invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandLine {
    /// Literal argument tokens, executable first. Never re-parsed by a shell.
    pub argv: Vec<String>,
    /// Whether any target-designating flag was emitted.
    pub has_target: bool,
}

impl CommandLine {
    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    pub fn args(&self) -> &[String] {
        &self.argv[1..]
    }

    /// Shell-quoted rendering for display and clipboard use.
    pub fn shell_quoted(&self) -> String {
        shell_words::join(self.argv.iter().map(String::as_str))
    }

    /// True if `flag` appears as a bare token or as a `flag=value` token.
    pub fn has_flag(&self, flag: &str) -> bool {
        self.argv.iter().any(|token| {
            token == flag
                || token
                    .strip_prefix(flag)
                    .is_some_and(|rest| rest.starts_with('='))
        })
    }

    /// Interactive flags present in this command line.
    pub fn interactive_flags(&self) -> Vec<&'static str> {
        INTERACTIVE_FLAGS
            .iter()
            .copied()
            .filter(|flag| self.has_flag(flag))
            .collect()
    }
}

/// Builds the argument vector for the current values.
///
/// The configured tool path is resolved up front so a bad configuration is a
/// synchronous, recoverable error here rather than a spawn failure later.
pub fn assemble(
    catalog: &Catalog,
    values: &ValueSet,
    tool: &ToolConfig,
) -> Result<CommandLine, AssembleError> {
    let mut argv = resolve_invocation(tool)?;
    let mut has_target = false;

    for spec in catalog.options() {
        if spec.technique.is_some() {
            continue;
        }
        let Some(emitted) = emit(spec, values.value_or_default(spec)) else {
            continue;
        };
        if TARGET_FLAGS.contains(&spec.flag) {
            has_target = true;
        }
        match emitted {
            Emitted::Bare => argv.push(spec.flag.to_string()),
            Emitted::Value(value) => {
                if spec.flag.starts_with("--") {
                    argv.push(format!("{}={}", spec.flag, value));
                } else {
                    argv.push(spec.flag.to_string());
                    argv.push(value);
                }
            }
        }
    }

    if let Some(letters) = technique_letters(catalog, values) {
        argv.push(format!("--technique={letters}"));
    }

    Ok(CommandLine { argv, has_target })
}

/// Resolves the configured tool invocation into its leading argv tokens.
///
/// The configured path may carry arguments of its own (`python3 sqlmap.py`),
/// so it is split with shell rules first. A bare `.py` script is routed
/// through the configured interpreter when the script is not itself runnable
/// from `PATH`.
pub fn resolve_invocation(tool: &ToolConfig) -> Result<Vec<String>, AssembleError> {
    let raw = tool.path.trim();
    if raw.is_empty() {
        return Err(AssembleError::PathNotSet);
    }
    let mut parts =
        shell_words::split(raw).map_err(|err| AssembleError::InvalidInvocation(err.to_string()))?;
    if parts.is_empty() {
        return Err(AssembleError::PathNotSet);
    }
    if resolve_program(&parts[0]).is_none() {
        return Err(AssembleError::ExecutableNotFound(parts[0].clone()));
    }
    let is_bare_name = Path::new(&parts[0]).components().count() == 1;
    if parts[0].to_lowercase().ends_with(".py")
        && !invokes_python(&parts[0])
        && !(is_bare_name && find_in_path(&parts[0]).is_some())
    {
        parts.insert(0, tool.python.clone());
    }
    Ok(parts)
}

enum Emitted {
    Bare,
    Value(String),
}

// Kind-specific default comparison. Text-likes additionally suppress empty
// values even when the default is non-empty, matching sqlmap's own treatment
// of a cleared field.
fn emit(spec: &OptionSpec, value: &OptionValue) -> Option<Emitted> {
    match (value, &spec.default) {
        (OptionValue::Flag(current), OptionValue::Flag(default)) => {
            (current != default).then_some(Emitted::Bare)
        }
        (OptionValue::Int(current), OptionValue::Int(default)) => {
            (current != default).then(|| Emitted::Value(current.to_string()))
        }
        (OptionValue::Choice(current), OptionValue::Choice(default)) => {
            (current != default && !current.is_empty()).then(|| Emitted::Value(current.clone()))
        }
        (OptionValue::Text(current), OptionValue::Text(default))
        | (OptionValue::Path(current), OptionValue::Path(default)) => {
            let current = current.trim();
            (current != default && !current.is_empty())
                .then(|| Emitted::Value(current.to_string()))
        }
        // A ValueSet cannot hold a kind-mismatched value.
        _ => None,
    }
}

// Letters whose boolean is set, in catalogue order. The flag is suppressed
// iff the selected letter *set* equals the default set; this is a set
// comparison, not a per-letter default comparison.
fn technique_letters(catalog: &Catalog, values: &ValueSet) -> Option<String> {
    let mut letters = String::new();
    let mut default_set = HashSet::new();
    for spec in catalog.options() {
        let Some(letter) = spec.technique else {
            continue;
        };
        if spec.default == OptionValue::Flag(true) {
            default_set.insert(letter);
        }
        if values.value_or_default(spec) == &OptionValue::Flag(true) {
            letters.push(letter);
        }
    }
    let selected: HashSet<char> = letters.chars().collect();
    if letters.is_empty() || selected == default_set {
        None
    } else {
        Some(letters)
    }
}

fn invokes_python(token: &str) -> bool {
    Path::new(token)
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.to_lowercase().starts_with("python"))
}

// Literal path first, PATH lookup second.
fn resolve_program(name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.exists() {
        return Some(candidate.to_path_buf());
    }
    if candidate.components().count() > 1 {
        return None;
    }
    find_in_path(name)
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let full = dir.join(name);
        if full.is_file() {
            return Some(full);
        }
        #[cfg(windows)]
        {
            let exe = dir.join(format!("{name}.exe"));
            if exe.is_file() {
                return Some(exe);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    // A tool config whose path is a real file in a temp dir, so the
    // pre-flight check passes without depending on the host system.
    fn fake_tool(dir: &tempfile::TempDir, name: &str) -> ToolConfig {
        let path = dir.path().join(name);
        std::fs::write(&path, "").unwrap();
        ToolConfig {
            path: path.to_string_lossy().into_owned(),
            python: "python3".to_string(),
        }
    }

    fn assemble_with(
        values: &ValueSet,
        tool: &ToolConfig,
    ) -> (CommandLine, Catalog) {
        let catalog = Catalog::sqlmap();
        let cmd = assemble(&catalog, values, tool).unwrap();
        (cmd, catalog)
    }

    #[test]
    fn all_defaults_emit_only_the_executable() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(&dir, "sqlmap");
        let (cmd, _) = assemble_with(&ValueSet::new(), &tool);
        assert_eq!(cmd.argv.len(), 1);
        assert_eq!(cmd.program(), tool.path);
        assert!(!cmd.has_target);
    }

    #[test]
    fn example_run_assembles_in_catalogue_order() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(&dir, "sqlmap");
        let catalog = Catalog::sqlmap();
        let mut values = ValueSet::new();
        values
            .set_parsed(&catalog, "target_url", "http://x/a.php?id=1")
            .unwrap();
        values.set_parsed(&catalog, "req_timeout", "45").unwrap();
        values.set_parsed(&catalog, "req_random_agent", "true").unwrap();
        let cmd = assemble(&catalog, &values, &tool).unwrap();
        assert_eq!(
            cmd.args(),
            [
                "-u",
                "http://x/a.php?id=1",
                "--random-agent",
                "--timeout=45",
            ]
        );
        assert!(cmd.has_target);
    }

    #[test]
    fn boolean_non_default_emits_bare_flag_only() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(&dir, "sqlmap");
        let catalog = Catalog::sqlmap();
        let mut values = ValueSet::new();
        values.set_parsed(&catalog, "gen_batch", "true").unwrap();
        let cmd = assemble(&catalog, &values, &tool).unwrap();
        assert_eq!(cmd.args(), ["--batch"]);
        assert!(!cmd.has_target);
    }

    #[test]
    fn short_flag_emits_two_tokens_long_flag_one() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(&dir, "sqlmap");
        let catalog = Catalog::sqlmap();
        let mut values = ValueSet::new();
        values.set_parsed(&catalog, "enum_db", "shop").unwrap();
        values.set_parsed(&catalog, "inj_tamper", "space2comment").unwrap();
        let cmd = assemble(&catalog, &values, &tool).unwrap();
        assert_eq!(cmd.args(), ["--tamper=space2comment", "-D", "shop"]);
    }

    #[test]
    fn every_target_flag_sets_has_target() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(&dir, "sqlmap");
        let catalog = Catalog::sqlmap();
        for id in [
            "target_url",
            "target_direct",
            "target_log",
            "target_bulk",
            "target_requestfile",
            "target_google",
            "target_config",
        ] {
            let mut values = ValueSet::new();
            values.set_parsed(&catalog, id, "something").unwrap();
            let cmd = assemble(&catalog, &values, &tool).unwrap();
            assert!(cmd.has_target, "{id} should designate a target");
        }
        let mut values = ValueSet::new();
        values.set_parsed(&catalog, "req_proxy", "http://127.0.0.1:8080").unwrap();
        let cmd = assemble(&catalog, &values, &tool).unwrap();
        assert!(!cmd.has_target);
    }

    #[test]
    fn url_option_emits_flag_then_value() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(&dir, "sqlmap");
        let catalog = Catalog::sqlmap();
        let mut values = ValueSet::new();
        values.set_parsed(&catalog, "target_url", "http://x/a.php?id=1").unwrap();
        let cmd = assemble(&catalog, &values, &tool).unwrap();
        let tail: Vec<_> = cmd.argv.iter().rev().take(2).rev().collect();
        assert_eq!(tail, ["-u", "http://x/a.php?id=1"]);
        assert!(cmd.has_target);
    }

    #[test]
    fn default_technique_set_is_suppressed() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(&dir, "sqlmap");
        let (cmd, _) = assemble_with(&ValueSet::new(), &tool);
        assert!(!cmd.argv.iter().any(|t| t.starts_with("--technique=")));
    }

    #[test]
    fn technique_subset_emits_letters_in_catalogue_order() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(&dir, "sqlmap");
        let catalog = Catalog::sqlmap();
        let mut values = ValueSet::new();
        for id in ["tech_b", "tech_e", "tech_t", "tech_q"] {
            values.set_parsed(&catalog, id, "false").unwrap();
        }
        // Only U and S remain checked; catalogue order puts U first.
        let cmd = assemble(&catalog, &values, &tool).unwrap();
        assert!(cmd.argv.contains(&"--technique=US".to_string()));
    }

    #[test]
    fn technique_missing_one_letter_emits_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(&dir, "sqlmap");
        let catalog = Catalog::sqlmap();
        let mut values = ValueSet::new();
        values.set_parsed(&catalog, "tech_t", "false").unwrap();
        let cmd = assemble(&catalog, &values, &tool).unwrap();
        assert!(cmd.argv.contains(&"--technique=BEUSQ".to_string()));
    }

    #[test]
    fn technique_empty_set_emits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(&dir, "sqlmap");
        let catalog = Catalog::sqlmap();
        let mut values = ValueSet::new();
        for id in ["tech_b", "tech_e", "tech_u", "tech_s", "tech_t", "tech_q"] {
            values.set_parsed(&catalog, id, "false").unwrap();
        }
        let cmd = assemble(&catalog, &values, &tool).unwrap();
        assert!(!cmd.argv.iter().any(|t| t.starts_with("--technique=")));
    }

    #[test]
    fn cleared_text_with_non_empty_default_is_not_emitted() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(&dir, "sqlmap");
        let catalog = Catalog::sqlmap();
        let mut values = ValueSet::new();
        values.set_parsed(&catalog, "gen_csv_del", "").unwrap();
        let cmd = assemble(&catalog, &values, &tool).unwrap();
        assert_eq!(cmd.argv.len(), 1);
    }

    #[test]
    fn choice_non_default_is_emitted() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(&dir, "sqlmap");
        let catalog = Catalog::sqlmap();
        let mut values = ValueSet::new();
        values.set_parsed(&catalog, "req_method", "POST").unwrap();
        let cmd = assemble(&catalog, &values, &tool).unwrap();
        assert_eq!(cmd.args(), ["--method=POST"]);
    }

    #[test]
    fn empty_path_is_a_configuration_error() {
        let tool = ToolConfig {
            path: "  ".to_string(),
            python: "python3".to_string(),
        };
        let catalog = Catalog::sqlmap();
        let err = assemble(&catalog, &ValueSet::new(), &tool).unwrap_err();
        assert!(matches!(err, AssembleError::PathNotSet));
    }

    #[test]
    fn unresolvable_path_is_a_configuration_error() {
        let tool = ToolConfig {
            path: "/definitely/not/here/sqlmap".to_string(),
            python: "python3".to_string(),
        };
        let catalog = Catalog::sqlmap();
        let err = assemble(&catalog, &ValueSet::new(), &tool).unwrap_err();
        match err {
            AssembleError::ExecutableNotFound(name) => {
                assert_eq!(name, "/definitely/not/here/sqlmap");
            }
            other => panic!("expected ExecutableNotFound, got {other:?}"),
        }
    }

    #[test]
    fn py_script_is_routed_through_the_interpreter() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(&dir, "sqlmap.py");
        let invocation = resolve_invocation(&tool).unwrap();
        assert_eq!(invocation[0], "python3");
        assert!(invocation[1].ends_with("sqlmap.py"));
    }

    #[test]
    fn explicit_interpreter_is_not_doubled() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("sqlmap.py");
        std::fs::write(&script, "").unwrap();
        let python = dir.path().join("python3");
        std::fs::write(&python, "").unwrap();
        let tool = ToolConfig {
            path: format!(
                "{} {}",
                python.to_string_lossy(),
                script.to_string_lossy()
            ),
            python: "python3".to_string(),
        };
        let invocation = resolve_invocation(&tool).unwrap();
        assert_eq!(invocation.len(), 2);
        assert!(invocation[0].ends_with("python3"));
    }

    #[test]
    fn interactive_flags_are_detected() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(&dir, "sqlmap");
        let catalog = Catalog::sqlmap();
        let mut values = ValueSet::new();
        values.set_parsed(&catalog, "os_shell", "true").unwrap();
        let cmd = assemble(&catalog, &values, &tool).unwrap();
        assert_eq!(cmd.interactive_flags(), ["--os-shell"]);
        assert!(!cmd.has_flag("--batch"));
        values.set_parsed(&catalog, "gen_batch", "true").unwrap();
        let cmd = assemble(&catalog, &values, &tool).unwrap();
        assert!(cmd.has_flag("--batch"));
    }
}
