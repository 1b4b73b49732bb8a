//! Option catalogue and per-option values.
//!
//! This module defines the immutable description of the sqlmap options the
//! assembler knows about (`OptionSpec`, collected in a `Catalog`) and the
//! caller-owned set of current values (`ValueSet`). The catalogue is plain
//! data; deciding what to emit from it lives in `command`.

use std::collections::HashMap;

/// The kind of value an option carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    /// Single-line free text.
    Text,
    /// Multi-line free text. Assembled identically to `Text`.
    LongText,
    /// Boolean switch, emitted as a bare flag.
    Flag,
    /// One of a fixed list of choices.
    Choice,
    /// Integer value.
    Int,
    /// Path to a file.
    FilePath,
    /// Path to a directory.
    DirPath,
}

impl OptionKind {
    /// Human-readable name of the value this kind expects, for error messages.
    pub fn expects(self) -> &'static str {
        match self {
            OptionKind::Text | OptionKind::LongText => "text",
            OptionKind::Flag => "boolean",
            OptionKind::Choice => "choice",
            OptionKind::Int => "integer",
            OptionKind::FilePath => "file path",
            OptionKind::DirPath => "directory path",
        }
    }
}

/// Current value for one option.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Text(String),
    Flag(bool),
    Choice(String),
    Int(i64),
    Path(String),
}

impl OptionValue {
    fn matches_kind(&self, kind: OptionKind) -> bool {
        matches!(
            (self, kind),
            (OptionValue::Text(_), OptionKind::Text)
                | (OptionValue::Text(_), OptionKind::LongText)
                | (OptionValue::Flag(_), OptionKind::Flag)
                | (OptionValue::Choice(_), OptionKind::Choice)
                | (OptionValue::Int(_), OptionKind::Int)
                | (OptionValue::Path(_), OptionKind::FilePath)
                | (OptionValue::Path(_), OptionKind::DirPath)
        )
    }

    /// Renders the value the way it appears on a command line.
    pub fn render(&self) -> String {
        match self {
            OptionValue::Text(s) | OptionValue::Choice(s) | OptionValue::Path(s) => s.clone(),
            OptionValue::Flag(b) => b.to_string(),
            OptionValue::Int(n) => n.to_string(),
        }
    }
}

/// Immutable description of one sqlmap option.
#[derive(Debug, Clone)]
pub struct OptionSpec {
    /// Unique key, stable across releases.
    pub id: &'static str,
    /// The literal flag token, e.g. `-u` or `--timeout`.
    pub flag: &'static str,
    pub kind: OptionKind,
    pub default: OptionValue,
    /// Valid values for `Choice` options; empty otherwise.
    pub choices: &'static [&'static str],
    /// Set for members of the `--technique` letter group. These options are
    /// excluded from per-option emission and folded into a single
    /// `--technique=<letters>` token instead.
    pub technique: Option<char>,
}

/// Declaration-ordered option catalogue.
///
/// Order matters: the assembler emits flags in catalogue order, and technique
/// letters concatenate in catalogue order.
#[derive(Debug, Clone)]
pub struct Catalog {
    options: Vec<OptionSpec>,
    index: HashMap<&'static str, usize>,
}

impl Catalog {
    pub fn options(&self) -> &[OptionSpec] {
        &self.options
    }

    pub fn get(&self, id: &str) -> Option<&OptionSpec> {
        self.index.get(id).map(|&i| &self.options[i])
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// The default sqlmap catalogue, following sqlmap's own help ordering.
    ///
    /// This is a representative set, not an exhaustive mirror of `sqlmap -hh`.
    pub fn sqlmap() -> Self {
        let mut b = Builder::default();

        // Target
        b.text("target_url", "-u");
        b.text("target_direct", "-d");
        b.file("target_log", "-l");
        b.file("target_bulk", "-m");
        b.file("target_requestfile", "-r");
        b.text("target_google", "-g");
        b.file("target_config", "-c");

        // Request
        b.text("req_agent", "-A");
        b.text("req_header", "-H");
        b.choice(
            "req_method",
            "--method",
            &["", "GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"],
            "",
        );
        b.text("req_data", "--data");
        b.text("req_param_del", "--param-del");
        b.text("req_cookie", "--cookie");
        b.text("req_cookie_del", "--cookie-del");
        b.file("req_load_cookies", "--load-cookies");
        b.flag("req_drop_set_cookie", "--drop-set-cookie");
        b.flag("req_http2", "--http2");
        b.flag("req_mobile", "--mobile");
        b.flag("req_random_agent", "--random-agent");
        b.text("req_host", "--host");
        b.text("req_referer", "--referer");
        b.long_text("req_headers", "--headers");
        b.choice(
            "req_auth_type",
            "--auth-type",
            &["", "Basic", "Digest", "Bearer", "NTLM"],
            "",
        );
        b.text("req_auth_cred", "--auth-cred");
        b.flag("req_ignore_proxy", "--ignore-proxy");
        b.flag("req_ignore_redirects", "--ignore-redirects");
        b.text("req_proxy", "--proxy");
        b.text("req_proxy_cred", "--proxy-cred");
        b.flag("req_tor", "--tor");
        b.int("req_tor_port", "--tor-port", 9050);
        b.choice("req_tor_type", "--tor-type", &["SOCKS5", "SOCKS4", "HTTP"], "SOCKS5");
        b.flag("req_check_tor", "--check-tor");
        b.int("req_delay", "--delay", 0);
        b.int("req_timeout", "--timeout", 30);
        b.int("req_retries", "--retries", 3);
        b.text("req_randomize", "--randomize");
        b.text("req_safe_url", "--safe-url");
        b.flag("req_skip_urlencode", "--skip-urlencode");
        b.text("req_csrf_token", "--csrf-token");
        b.text("req_csrf_url", "--csrf-url");
        b.flag("req_force_ssl", "--force-ssl");
        b.flag("req_chunked", "--chunked");
        b.flag("req_hpp", "--hpp");
        b.long_text("req_eval", "--eval");

        // Optimization
        b.flag("opt_all", "-o");
        b.flag("opt_predict_output", "--predict-output");
        b.flag("opt_keep_alive", "--keep-alive");
        b.flag("opt_null_connection", "--null-connection");
        b.int("opt_threads", "--threads", 1);

        // Injection
        b.text("inj_param", "-p");
        b.text("inj_skip", "--skip");
        b.flag("inj_skip_static", "--skip-static");
        b.text("inj_dbms", "--dbms");
        b.text("inj_dbms_cred", "--dbms-cred");
        b.choice("inj_os", "--os", &["", "Linux", "Windows"], "");
        b.flag("inj_no_cast", "--no-cast");
        b.flag("inj_no_escape", "--no-escape");
        b.text("inj_prefix", "--prefix");
        b.text("inj_suffix", "--suffix");
        b.text("inj_tamper", "--tamper");

        // Detection
        b.int("det_level", "--level", 1);
        b.int("det_risk", "--risk", 1);
        b.text("det_string", "--string");
        b.text("det_not_string", "--not-string");
        b.text("det_regexp", "--regexp");
        b.int("det_code", "--code", 200);
        b.flag("det_smart", "--smart");
        b.flag("det_text_only", "--text-only");
        b.flag("det_titles", "--titles");

        // Techniques
        b.technique("tech_b", 'B');
        b.technique("tech_e", 'E');
        b.technique("tech_u", 'U');
        b.technique("tech_s", 'S');
        b.technique("tech_t", 'T');
        b.technique("tech_q", 'Q');
        b.int("tech_time_sec", "--time-sec", 5);
        b.text("tech_union_cols", "--union-cols");
        b.text("tech_union_char", "--union-char");
        b.text("tech_union_from", "--union-from");
        b.text("tech_dns_domain", "--dns-domain");
        b.text("tech_second_url", "--second-url");

        // Fingerprint
        b.flag("fp_fingerprint", "--fingerprint");

        // Enumeration
        b.flag("enum_all", "--all");
        b.flag("enum_banner", "--banner");
        b.flag("enum_current_user", "--current-user");
        b.flag("enum_current_db", "--current-db");
        b.flag("enum_hostname", "--hostname");
        b.flag("enum_is_dba", "--is-dba");
        b.flag("enum_users", "--users");
        b.flag("enum_passwords", "--passwords");
        b.flag("enum_privileges", "--privileges");
        b.flag("enum_dbs", "--dbs");
        b.flag("enum_tables", "--tables");
        b.flag("enum_columns", "--columns");
        b.flag("enum_schema", "--schema");
        b.flag("enum_count", "--count");
        b.flag("enum_dump", "--dump");
        b.flag("enum_dump_all", "--dump-all");
        b.flag("enum_exclude_sysdbs", "--exclude-sysdbs");
        b.flag("enum_sql_shell", "--sql-shell");
        b.text("enum_db", "-D");
        b.text("enum_table", "-T");
        b.text("enum_column", "-C");
        b.text("enum_user", "-U");
        b.text("enum_where", "--where");
        b.int("enum_start", "--start", 0);
        b.int("enum_stop", "--stop", 0);
        b.long_text("enum_sql_query", "--sql-query");
        b.file("enum_sql_file", "--sql-file");

        // Brute force
        b.flag("brute_common_tables", "--common-tables");
        b.flag("brute_common_columns", "--common-columns");
        b.flag("brute_common_files", "--common-files");

        // File system access
        b.text("fs_file_read", "--file-read");
        b.file("fs_file_write", "--file-write");
        b.text("fs_file_dest", "--file-dest");

        // Operating system access
        b.text("os_cmd", "--os-cmd");
        b.flag("os_shell", "--os-shell");
        b.flag("os_pwn", "--os-pwn");
        b.dir("os_msf_path", "--msf-path");
        b.text("os_tmp_path", "--tmp-path");

        // General
        b.file("gen_session_file", "-s");
        b.file("gen_traffic_file", "-t");
        b.text("gen_answers", "--answers");
        b.flag("gen_batch", "--batch");
        b.text("gen_charset", "--charset");
        b.int("gen_crawl", "--crawl", 0);
        b.text_with_default("gen_csv_del", "--csv-del", ",");
        b.choice("gen_dump_format", "--dump-format", &["CSV", "HTML", "SQLITE"], "CSV");
        b.text("gen_encoding", "--encoding");
        b.flag("gen_eta", "--eta");
        b.flag("gen_flush_session", "--flush-session");
        b.flag("gen_forms", "--forms");
        b.flag("gen_fresh_queries", "--fresh-queries");
        b.flag("gen_hex", "--hex");
        b.dir("gen_output_dir", "--output-dir");
        b.flag("gen_parse_errors", "--parse-errors");
        b.text("gen_scope", "--scope");
        b.flag("gen_skip_waf", "--skip-waf");
        b.text_with_default("gen_table_prefix", "--table-prefix", "sqlmap");
        b.text("gen_test_filter", "--test-filter");
        b.int("gen_time_limit", "--time-limit", 0);
        b.text("gen_web_root", "--web-root");

        // Miscellaneous
        b.text("misc_mnemonics", "-z");
        b.text("misc_alert", "--alert");
        b.flag("misc_beep", "--beep");
        b.flag("misc_disable_coloring", "--disable-coloring");
        b.flag("misc_no_logging", "--no-logging");
        b.flag("misc_offline", "--offline");
        b.flag("misc_purge", "--purge");
        b.flag("misc_shell", "--shell");
        b.dir("misc_tmp_dir", "--tmp-dir");
        b.flag("misc_unstable", "--unstable");
        b.flag("misc_update", "--update");
        b.flag("misc_wizard", "--wizard");

        b.build()
    }
}

#[derive(Default)]
struct Builder {
    options: Vec<OptionSpec>,
}

impl Builder {
    fn push(&mut self, spec: OptionSpec) {
        self.options.push(spec);
    }

    fn text(&mut self, id: &'static str, flag: &'static str) {
        self.text_with_default(id, flag, "");
    }

    fn text_with_default(&mut self, id: &'static str, flag: &'static str, default: &str) {
        self.push(OptionSpec {
            id,
            flag,
            kind: OptionKind::Text,
            default: OptionValue::Text(default.to_string()),
            choices: &[],
            technique: None,
        });
    }

    fn long_text(&mut self, id: &'static str, flag: &'static str) {
        self.push(OptionSpec {
            id,
            flag,
            kind: OptionKind::LongText,
            default: OptionValue::Text(String::new()),
            choices: &[],
            technique: None,
        });
    }

    fn flag(&mut self, id: &'static str, flag: &'static str) {
        self.push(OptionSpec {
            id,
            flag,
            kind: OptionKind::Flag,
            default: OptionValue::Flag(false),
            choices: &[],
            technique: None,
        });
    }

    fn int(&mut self, id: &'static str, flag: &'static str, default: i64) {
        self.push(OptionSpec {
            id,
            flag,
            kind: OptionKind::Int,
            default: OptionValue::Int(default),
            choices: &[],
            technique: None,
        });
    }

    fn choice(
        &mut self,
        id: &'static str,
        flag: &'static str,
        choices: &'static [&'static str],
        default: &str,
    ) {
        self.push(OptionSpec {
            id,
            flag,
            kind: OptionKind::Choice,
            default: OptionValue::Choice(default.to_string()),
            choices,
            technique: None,
        });
    }

    fn file(&mut self, id: &'static str, flag: &'static str) {
        self.push(OptionSpec {
            id,
            flag,
            kind: OptionKind::FilePath,
            default: OptionValue::Path(String::new()),
            choices: &[],
            technique: None,
        });
    }

    fn dir(&mut self, id: &'static str, flag: &'static str) {
        self.push(OptionSpec {
            id,
            flag,
            kind: OptionKind::DirPath,
            default: OptionValue::Path(String::new()),
            choices: &[],
            technique: None,
        });
    }

    // Technique letters default to checked, matching sqlmap's BEUSTQ default.
    fn technique(&mut self, id: &'static str, letter: char) {
        self.push(OptionSpec {
            id,
            flag: "",
            kind: OptionKind::Flag,
            default: OptionValue::Flag(true),
            choices: &[],
            technique: Some(letter),
        });
    }

    fn build(self) -> Catalog {
        let mut index = HashMap::with_capacity(self.options.len());
        for (i, spec) in self.options.iter().enumerate() {
            let previous = index.insert(spec.id, i);
            debug_assert!(previous.is_none(), "duplicate option id {}", spec.id);
        }
        Catalog {
            options: self.options,
            index,
        }
    }
}

/// Error raised when storing a value into a `ValueSet`.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ValueError {
    #[error("unknown option '{0}'")]
    UnknownOption(String),
    #[error("option '{id}' expects a {expected} value")]
    KindMismatch { id: String, expected: &'static str },
    #[error("option '{id}': '{value}' is not a valid value")]
    Invalid { id: String, value: String },
}

/// Caller-owned mapping from option id to its current value.
///
/// Only explicitly set options are stored; everything else reads through to
/// the catalogue default. Mutation is validated against the catalogue so a
/// `ValueSet` can never hold a value of the wrong kind.
#[derive(Debug, Clone, Default)]
pub struct ValueSet {
    values: HashMap<&'static str, OptionValue>,
}

impl ValueSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&OptionValue> {
        self.values.get(id)
    }

    /// Current value of `spec`, falling back to its default.
    pub fn value_or_default<'a>(&'a self, spec: &'a OptionSpec) -> &'a OptionValue {
        self.values.get(spec.id).unwrap_or(&spec.default)
    }

    pub fn set(
        &mut self,
        catalog: &Catalog,
        id: &str,
        value: OptionValue,
    ) -> Result<(), ValueError> {
        let spec = catalog
            .get(id)
            .ok_or_else(|| ValueError::UnknownOption(id.to_string()))?;
        if !value.matches_kind(spec.kind) {
            return Err(ValueError::KindMismatch {
                id: id.to_string(),
                expected: spec.kind.expects(),
            });
        }
        if let OptionValue::Choice(chosen) = &value {
            if !spec.choices.contains(&chosen.as_str()) {
                return Err(ValueError::Invalid {
                    id: id.to_string(),
                    value: chosen.clone(),
                });
            }
        }
        self.values.insert(spec.id, value);
        Ok(())
    }

    /// Parses `raw` according to the option's kind and stores it.
    ///
    /// This is the entry point for `--set key=value` and the `[values]`
    /// config table.
    pub fn set_parsed(
        &mut self,
        catalog: &Catalog,
        id: &str,
        raw: &str,
    ) -> Result<(), ValueError> {
        let spec = catalog
            .get(id)
            .ok_or_else(|| ValueError::UnknownOption(id.to_string()))?;
        let value = match spec.kind {
            OptionKind::Text | OptionKind::LongText => OptionValue::Text(raw.to_string()),
            OptionKind::Choice => OptionValue::Choice(raw.to_string()),
            OptionKind::FilePath | OptionKind::DirPath => OptionValue::Path(raw.to_string()),
            OptionKind::Flag => OptionValue::Flag(parse_bool(raw).ok_or_else(|| {
                ValueError::Invalid {
                    id: id.to_string(),
                    value: raw.to_string(),
                }
            })?),
            OptionKind::Int => {
                OptionValue::Int(raw.trim().parse().map_err(|_| ValueError::Invalid {
                    id: id.to_string(),
                    value: raw.to_string(),
                })?)
            }
        };
        self.set(catalog, id, value)
    }

    pub fn clear(&mut self, id: &str) {
        self.values.remove(id);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_ids_are_unique() {
        let catalog = Catalog::sqlmap();
        let mut seen = std::collections::HashSet::new();
        for spec in catalog.options() {
            assert!(seen.insert(spec.id), "duplicate id {}", spec.id);
        }
        assert!(!catalog.is_empty());
        assert_eq!(seen.len(), catalog.len());
    }

    #[test]
    fn defaults_match_kinds() {
        let catalog = Catalog::sqlmap();
        for spec in catalog.options() {
            assert!(
                spec.default.matches_kind(spec.kind),
                "default of {} does not match its kind",
                spec.id
            );
        }
    }

    #[test]
    fn technique_group_is_beustq_in_order() {
        let catalog = Catalog::sqlmap();
        let letters: Vec<char> = catalog
            .options()
            .iter()
            .filter_map(|spec| spec.technique)
            .collect();
        assert_eq!(letters, vec!['B', 'E', 'U', 'S', 'T', 'Q']);
        for spec in catalog.options().iter().filter(|s| s.technique.is_some()) {
            assert_eq!(spec.default, OptionValue::Flag(true));
        }
    }

    #[test]
    fn set_rejects_unknown_option() {
        let catalog = Catalog::sqlmap();
        let mut values = ValueSet::new();
        let err = values
            .set(&catalog, "bogus", OptionValue::Flag(true))
            .unwrap_err();
        assert_eq!(err, ValueError::UnknownOption("bogus".to_string()));
    }

    #[test]
    fn set_rejects_kind_mismatch() {
        let catalog = Catalog::sqlmap();
        let mut values = ValueSet::new();
        let err = values
            .set(&catalog, "req_timeout", OptionValue::Text("45".into()))
            .unwrap_err();
        assert_eq!(
            err,
            ValueError::KindMismatch {
                id: "req_timeout".to_string(),
                expected: "integer",
            }
        );
    }

    #[test]
    fn set_rejects_invalid_choice() {
        let catalog = Catalog::sqlmap();
        let mut values = ValueSet::new();
        assert!(values
            .set(&catalog, "req_method", OptionValue::Choice("POST".into()))
            .is_ok());
        assert!(values
            .set(&catalog, "req_method", OptionValue::Choice("BREW".into()))
            .is_err());
    }

    #[test]
    fn set_parsed_follows_kind() {
        let catalog = Catalog::sqlmap();
        let mut values = ValueSet::new();
        values.set_parsed(&catalog, "req_timeout", "45").unwrap();
        values.set_parsed(&catalog, "req_random_agent", "yes").unwrap();
        values.set_parsed(&catalog, "target_url", "http://x/").unwrap();
        assert_eq!(values.get("req_timeout"), Some(&OptionValue::Int(45)));
        assert_eq!(values.get("req_random_agent"), Some(&OptionValue::Flag(true)));
        assert_eq!(
            values.get("target_url"),
            Some(&OptionValue::Text("http://x/".into()))
        );
        assert!(values.set_parsed(&catalog, "req_timeout", "soon").is_err());
        assert!(values.set_parsed(&catalog, "req_random_agent", "maybe").is_err());
    }

    #[test]
    fn value_or_default_reads_through() {
        let catalog = Catalog::sqlmap();
        let mut values = ValueSet::new();
        assert!(values.is_empty());
        let spec = catalog.get("req_timeout").unwrap();
        assert_eq!(values.value_or_default(spec), &OptionValue::Int(30));
        values.set(&catalog, "req_timeout", OptionValue::Int(45)).unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values.value_or_default(spec), &OptionValue::Int(45));
        values.clear("req_timeout");
        assert_eq!(values.value_or_default(spec), &OptionValue::Int(30));
    }
}
