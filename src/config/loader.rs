use std::path::{Path, PathBuf};

use crate::error::GrantflowError;

use super::env::expand_config;
use super::types::GrantflowConfig;

pub const CONFIG_ENV_VAR: &str = "GRANTFLOW_CONFIG";

#[derive(Clone, Copy, PartialEq, Eq)]
enum Lexer {
    Code,
    Str,
    StrEscape,
    LineComment,
    BlockComment,
    BlockCommentStar,
}

/// Strip `//` and `/* */` comments from JSONC input. Newlines inside comments
/// are kept so serde_json error positions still match the file.
pub fn strip_jsonc_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut state = Lexer::Code;
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        state = match (state, ch) {
            (Lexer::Code, '"') => {
                out.push(ch);
                Lexer::Str
            }
            (Lexer::Code, '/') if chars.peek() == Some(&'/') => {
                chars.next();
                Lexer::LineComment
            }
            (Lexer::Code, '/') if chars.peek() == Some(&'*') => {
                chars.next();
                Lexer::BlockComment
            }
            (Lexer::Code, _) => {
                out.push(ch);
                Lexer::Code
            }
            (Lexer::Str, '\\') => {
                out.push(ch);
                Lexer::StrEscape
            }
            (Lexer::Str, '"') => {
                out.push(ch);
                Lexer::Code
            }
            (Lexer::Str, _) | (Lexer::StrEscape, _) => {
                out.push(ch);
                Lexer::Str
            }
            (Lexer::LineComment, '\n') => {
                out.push('\n');
                Lexer::Code
            }
            (Lexer::LineComment, _) => Lexer::LineComment,
            (Lexer::BlockComment | Lexer::BlockCommentStar, '\n') => {
                out.push('\n');
                Lexer::BlockComment
            }
            (Lexer::BlockComment | Lexer::BlockCommentStar, '*') => Lexer::BlockCommentStar,
            (Lexer::BlockCommentStar, '/') => Lexer::Code,
            (Lexer::BlockComment | Lexer::BlockCommentStar, _) => Lexer::BlockComment,
        };
    }

    out
}

/// Existing config files, highest precedence first: the `--config` flag,
/// `$GRANTFLOW_CONFIG`, `./config/grantflow.json`, then
/// `~/.grantflow/grantflow.json` (or `.jsonc` when the `.json` is absent).
pub fn discover_config_files(cli_config: Option<&str>) -> Vec<PathBuf> {
    let home_file = dirs::home_dir().map(|home| {
        let dir = home.join(".grantflow");
        let json = dir.join("grantflow.json");
        if json.exists() {
            json
        } else {
            dir.join("grantflow.jsonc")
        }
    });

    let candidates = [
        cli_config.map(PathBuf::from),
        std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from),
        Some(PathBuf::from("config").join("grantflow.json")),
        home_file,
    ];

    candidates
        .into_iter()
        .flatten()
        .fold(Vec::new(), |mut found, path| {
            if path.is_file() && !found.contains(&path) {
                found.push(path);
            }
            found
        })
}

/// Read one JSON or JSONC file.
pub fn load_config_file(path: &Path) -> Result<GrantflowConfig, GrantflowError> {
    let content = std::fs::read_to_string(path).map_err(|e| GrantflowError::ConfigError {
        path: path.to_path_buf(),
        detail: format!("Cannot read file: {e}"),
    })?;

    let stripped = strip_jsonc_comments(&content);
    serde_json::from_str::<GrantflowConfig>(&stripped).map_err(|e| GrantflowError::ConfigError {
        path: path.to_path_buf(),
        detail: format!("Invalid JSON: {e}"),
    })
}

/// Fill sections `target` lacks from `source`.
fn merge_sections(target: &mut GrantflowConfig, source: GrantflowConfig) {
    if target.device.is_none() {
        target.device = source.device;
    }
    if target.store.is_none() {
        target.store = source.store;
    }
    if target.payment.is_none() {
        target.payment = source.payment;
    }
}

/// Merge the given files in order, then expand environment variables.
pub fn load_config_files(files: &[PathBuf]) -> Result<GrantflowConfig, GrantflowError> {
    let mut merged = GrantflowConfig::default();
    for path in files {
        let cfg = load_config_file(path)?;
        tracing::debug!(path = %path.display(), "loaded config file");
        merge_sections(&mut merged, cfg);
    }
    expand_config(&mut merged)?;
    Ok(merged)
}

/// Discover, load, merge and expand all configuration.
///
/// An explicit `--config` path that does not exist is an error; every other
/// location is optional.
pub fn load_config(cli_config: Option<&str>) -> Result<GrantflowConfig, GrantflowError> {
    if let Some(path) = cli_config {
        if !Path::new(path).exists() {
            return Err(GrantflowError::ConfigError {
                path: PathBuf::from(path),
                detail: "File not found".into(),
            });
        }
    }
    load_config_files(&discover_config_files(cli_config))
}
