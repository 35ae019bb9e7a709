//! SurrealDB-backed mirror sink, driven through the `surreal` CLI binary
//! (`surreal sql --json` over a spawned process). Sections are mirrored
//! keyed by filename with last-writer-wins semantics; audit rows are
//! write-once. Every operation returns `Result<_, String>` and callers
//! treat failures as warnings — the filesystem stays authoritative.

use std::io::Write;
use std::process::{Command, Stdio};

use weld_audit::{now_rfc3339, AuditEntry};
use weld_store::{sha256_hex, MirrorSection, MirrorStore};

#[derive(Debug, Clone)]
pub struct SurrealCliConfig {
    pub endpoint: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub surreal_bin: String,
}

impl Default for SurrealCliConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:8000".to_string(),
            namespace: "weld".to_string(),
            database: "site".to_string(),
            username: None,
            password: None,
            surreal_bin: "surreal".to_string(),
        }
    }
}

impl SurrealCliConfig {
    /// Environment overrides: WELD_SURREAL_ENDPOINT, WELD_SURREAL_NS,
    /// WELD_SURREAL_DB, WELD_SURREAL_USER, WELD_SURREAL_PASS,
    /// WELD_SURREAL_BIN.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(endpoint) = std::env::var("WELD_SURREAL_ENDPOINT") {
            if !endpoint.is_empty() {
                config.endpoint = endpoint;
            }
        }
        if let Ok(ns) = std::env::var("WELD_SURREAL_NS") {
            if !ns.is_empty() {
                config.namespace = ns;
            }
        }
        if let Ok(db) = std::env::var("WELD_SURREAL_DB") {
            if !db.is_empty() {
                config.database = db;
            }
        }
        config.username = std::env::var("WELD_SURREAL_USER").ok().filter(|s| !s.is_empty());
        config.password = std::env::var("WELD_SURREAL_PASS").ok().filter(|s| !s.is_empty());
        if let Ok(bin) = std::env::var("WELD_SURREAL_BIN") {
            if !bin.is_empty() {
                config.surreal_bin = bin;
            }
        }
        config
    }
}

#[derive(Debug, Clone)]
pub struct SurrealCliMirror {
    config: SurrealCliConfig,
}

struct SqlRunOutput {
    values: Vec<serde_json::Value>,
    stdout: String,
    stderr: String,
}

impl SurrealCliMirror {
    pub fn new(config: SurrealCliConfig) -> SurrealCliMirror {
        SurrealCliMirror { config }
    }

    pub fn config(&self) -> &SurrealCliConfig {
        &self.config
    }

    fn run_sql_output(&self, sql: &str) -> Result<SqlRunOutput, String> {
        let mut cmd = Command::new(&self.config.surreal_bin);
        cmd.arg("sql")
            .arg("--hide-welcome")
            .arg("--endpoint")
            .arg(&self.config.endpoint)
            .arg("--namespace")
            .arg(&self.config.namespace)
            .arg("--database")
            .arg(&self.config.database)
            .arg("--json");
        if let Some(user) = &self.config.username {
            cmd.arg("--username").arg(user);
        }
        if let Some(pass) = &self.config.password {
            cmd.arg("--password").arg(pass);
        }

        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| format!("spawn surreal sql: {}", err))?;

        child
            .stdin
            .as_mut()
            .ok_or_else(|| "failed to open surreal sql stdin".to_string())?
            .write_all(sql.as_bytes())
            .map_err(|err| format!("write surreal sql stdin: {}", err))?;

        let output = child
            .wait_with_output()
            .map_err(|err| format!("wait surreal sql: {}", err))?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !output.status.success() {
            return Err(format!(
                "surreal sql failed (exit={}):\nstdout:\n{}\nstderr:\n{}",
                output.status, stdout, stderr
            ));
        }
        // `surreal sql --json` may exit 0 even when statements fail; errors
        // surface inside the JSON stream instead.
        let values = parse_json_stream(&stdout).map_err(|err| {
            format!(
                "surreal sql returned non-json output: {}\nstdout:\n{}\nstderr:\n{}",
                err, stdout, stderr
            )
        })?;
        Ok(SqlRunOutput {
            values,
            stdout,
            stderr,
        })
    }

    fn run_sql(&self, sql: &str) -> Result<(), String> {
        let output = self.run_sql_output(sql)?;
        check_surreal_json_stream(&output.values).map_err(|msg| {
            format!(
                "{}\nstdout:\n{}\nstderr:\n{}",
                msg, output.stdout, output.stderr
            )
        })
    }

    /// Idempotent table/index definitions. "already exists" is tolerated.
    pub fn ensure_schema(&self) -> Result<(), String> {
        let sql = r#"
DEFINE TABLE section SCHEMALESS;
DEFINE INDEX section_filename ON TABLE section COLUMNS filename UNIQUE;
DEFINE TABLE audit SCHEMALESS;
DEFINE INDEX audit_element_id ON TABLE audit COLUMNS element_id;
DEFINE INDEX audit_filename ON TABLE audit COLUMNS filename;
"#;
        let output = self.run_sql_output(sql)?;
        check_surreal_json_stream_allow_already_exists(&output.values).map_err(|msg| {
            format!(
                "{}\nstdout:\n{}\nstderr:\n{}",
                msg, output.stdout, output.stderr
            )
        })
    }

    fn select_rows_from_single_select(&self, sql: &str) -> Result<Vec<serde_json::Value>, String> {
        let output = self.run_sql_output(sql)?;
        check_surreal_json_stream(&output.values).map_err(|msg| {
            format!(
                "{}\nstdout:\n{}\nstderr:\n{}",
                msg, output.stdout, output.stderr
            )
        })?;
        let Some(first) = output.values.first() else {
            return Ok(Vec::new());
        };
        // Surreal JSON shape for SELECT: [[{...}, ...]]
        let Some(top) = first.as_array() else {
            return Ok(Vec::new());
        };
        let Some(inner) = top.first().and_then(|v| v.as_array()) else {
            return Ok(Vec::new());
        };
        Ok(inner.clone())
    }
}

impl MirrorStore for SurrealCliMirror {
    fn is_ready(&self) -> Result<bool, String> {
        let output = Command::new(&self.config.surreal_bin)
            .arg("is-ready")
            .arg("--endpoint")
            .arg(&self.config.endpoint)
            .output()
            .map_err(|err| format!("spawn surreal is-ready: {}", err))?;
        if !output.status.success() {
            return Ok(false);
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.trim() == "OK")
    }

    fn upsert_section(&self, filename: &str, content: &str, actor: &str) -> Result<(), String> {
        self.ensure_schema()?;
        self.run_sql(&upsert_section_sql(filename, content, actor, &now_rfc3339()))
    }

    fn append_audit(&self, entry: &AuditEntry) -> Result<(), String> {
        self.ensure_schema()?;
        self.run_sql(&audit_create_sql(entry)?)
    }

    fn list_sections(&self) -> Result<Vec<MirrorSection>, String> {
        let rows = self.select_rows_from_single_select(
            "SELECT filename, content, content_sha256, updated_at, updated_by FROM section;",
        )?;
        rows.iter().map(mirror_section_from_row).collect()
    }
}

fn thing(table: &str, id: &str) -> String {
    format!("{}:{}", table, id)
}

fn json_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// Record id derives from the filename alone, giving filename-keyed
/// last-writer-wins on repeated upserts.
fn upsert_section_sql(filename: &str, content: &str, actor: &str, updated_at: &str) -> String {
    let id = sha256_hex(filename);
    format!(
        "UPSERT {thing_id} CONTENT {{ filename: {filename}, content: {content}, content_sha256: {sha}, updated_at: {updated_at}, updated_by: {actor} }} RETURN NONE;",
        thing_id = thing("section", &id[..16]),
        filename = json_string(filename),
        content = json_string(content),
        sha = json_string(&sha256_hex(content)),
        updated_at = json_string(updated_at),
        actor = json_string(actor),
    )
}

fn audit_create_sql(entry: &AuditEntry) -> Result<String, String> {
    let body = serde_json::to_string(entry).map_err(|err| format!("json encode audit: {}", err))?;
    Ok(format!("CREATE audit CONTENT {} RETURN NONE;", body))
}

fn mirror_section_from_row(row: &serde_json::Value) -> Result<MirrorSection, String> {
    let str_field = |name: &str| -> Result<String, String> {
        row.get(name)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| format!("section row missing field {}: {}", name, row))
    };
    Ok(MirrorSection {
        filename: str_field("filename")?,
        content: str_field("content")?,
        content_sha256: str_field("content_sha256")?,
        updated_at: str_field("updated_at")?,
        updated_by: str_field("updated_by")?,
    })
}

fn parse_json_stream(input: &str) -> Result<Vec<serde_json::Value>, serde_json::Error> {
    let mut out = Vec::new();
    let deser = serde_json::Deserializer::from_str(input);
    for item in deser.into_iter::<serde_json::Value>() {
        out.push(item?);
    }
    Ok(out)
}

fn check_surreal_json_stream(values: &[serde_json::Value]) -> Result<(), String> {
    if values.is_empty() {
        return Err("surreal sql returned empty json stream".to_string());
    }
    for v in values {
        // `null` entries come back for statements that return no rows
        // (DEFINE, UPSERT ... RETURN NONE); those are successes.
        if let Some(arr) = v.as_array() {
            if array_looks_like_error(arr) {
                return Err("surreal sql reported error result".to_string());
            }
        }
    }
    Ok(())
}

fn check_surreal_json_stream_allow_already_exists(
    values: &[serde_json::Value],
) -> Result<(), String> {
    if values.is_empty() {
        return Err("surreal sql returned empty json stream".to_string());
    }
    for v in values {
        let Some(arr) = v.as_array() else {
            continue;
        };
        if !array_looks_like_error(arr) {
            continue;
        }
        let all_already_exists = arr.iter().all(|x| {
            x.as_str()
                .is_some_and(|s| s.to_lowercase().contains("already exists"))
        });
        if !all_already_exists {
            return Err("surreal sql reported error result".to_string());
        }
    }
    Ok(())
}

fn array_looks_like_error(arr: &[serde_json::Value]) -> bool {
    // `surreal sql --json` has been observed to report failures as an array
    // of strings rather than a non-zero exit.
    if arr.is_empty() {
        return false;
    }
    arr.iter().any(|v| {
        v.as_str().is_some_and(|s| {
            s.contains("Parse error")
                || s.contains("IAM error")
                || s.contains("The database encountered")
                || s.contains("error:")
        })
    })
}
