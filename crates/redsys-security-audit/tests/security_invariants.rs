//! Security invariant tests for the RedSys notification crate.
//!
//! These scan the production sources and fail when a change regresses one of
//! the properties verification and credential handling rely on.

use regex::Regex;
use std::path::Path;
use walkdir::WalkDir;

/// Read all .rs source files from production crates (excluding tests and this crate).
fn production_source_files() -> Vec<(String, String)> {
    let root = Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .parent()
        .unwrap();

    let crates_dir = root.join("crates");
    let mut files = Vec::new();

    for entry in WalkDir::new(&crates_dir).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();

        if path.extension().and_then(|e| e.to_str()) != Some("rs") {
            continue;
        }

        if path
            .to_str()
            .map(|s| s.contains("security-audit"))
            .unwrap_or(false)
        {
            continue;
        }

        let path_str = path.to_str().unwrap_or("");
        if path_str.contains("tests/") || path_str.contains("\\tests\\") {
            continue;
        }

        if let Ok(content) = std::fs::read_to_string(path) {
            files.push((path_str.to_string(), content));
        }
    }

    files
}

/// Lines outside `#[cfg(test)]` modules and `mod tests` blocks.
/// Heuristic: drops everything after the first `#[cfg(test)]` in a file.
fn production_lines(content: &str) -> String {
    let mut result = Vec::new();
    let mut in_test_module = false;

    for line in content.lines() {
        if line.contains("#[cfg(test)]") || line.trim().starts_with("mod tests") {
            in_test_module = true;
        }
        if !in_test_module {
            result.push(line);
        }
    }

    result.join("\n")
}

/// Production lines with comments and doc examples removed.
fn code_lines(content: &str) -> String {
    production_lines(content)
        .lines()
        .filter(|l| !l.trim_start().starts_with("//"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn function_body<'a>(content: &'a str, signature: &str) -> Option<&'a str> {
    let start = content.find(signature)?;
    let body = &content[start..];
    let end = body[1..]
        .find("\nfn ")
        .or_else(|| body[1..].find("\npub fn "))
        .or_else(|| body[1..].find("\n#[cfg(test)]"))
        .unwrap_or(body.len() - 1)
        + 1;
    Some(&body[..end])
}

#[test]
fn no_hardcoded_keys_in_production_code() {
    // base64 string literals long enough to be a terminal or vault key
    let key_re = Regex::new(r#""[A-Za-z0-9+/]{32,}={0,2}""#).unwrap();
    let files = production_source_files();

    for (path, content) in &files {
        let code = code_lines(content);
        for line in code.lines() {
            assert!(
                !key_re.is_match(line),
                "Potential hardcoded key found at {}: {}",
                path,
                line.trim()
            );
        }
    }
}

#[test]
fn signature_comparison_has_no_early_returns() {
    let files = production_source_files();
    let mut checked = false;

    for (path, content) in &files {
        if !path.ends_with("hmac.rs") {
            continue;
        }
        let Some(func_text) = function_body(content, "pub fn signatures_match") else {
            continue;
        };
        checked = true;

        assert!(
            !func_text.contains("return "),
            "signatures_match at {} returns early. Decode failures must still run the comparison.",
            path
        );
        assert!(
            func_text.contains("constant_time_eq("),
            "signatures_match at {} does not use constant_time_eq.",
            path
        );
    }

    assert!(checked, "signatures_match not found in any hmac.rs");
}

#[test]
fn signatures_never_compared_with_string_equality() {
    let eq_re = Regex::new(r"(expected|signature|received)\s*[!=]=|[!=]=\s*&?(expected|signature|received)\b").unwrap();
    let files = production_source_files();

    for (path, content) in &files {
        if !(path.ends_with("hmac.rs") || path.ends_with("verifier.rs")) {
            continue;
        }
        let code = code_lines(content);
        for line in code.lines() {
            assert!(
                !eq_re.is_match(line),
                "Signature compared with == at {}: {}. Use signatures_match.",
                path,
                line.trim()
            );
        }
    }
}

#[test]
fn http_clients_disable_redirects() {
    let files = production_source_files();
    let builder_re = Regex::new(r"reqwest::Client::builder\(\)").unwrap();
    let redirect_re = Regex::new(r"redirect\s*\(\s*.*Policy::none\(\)").unwrap();

    for (path, content) in &files {
        let prod_content = production_lines(content);

        for mat in builder_re.find_iter(&prod_content) {
            let search_end = (mat.end() + 500).min(prod_content.len());
            let builder_chain = &prod_content[mat.start()..search_end];

            assert!(
                redirect_re.is_match(builder_chain),
                "reqwest::Client::builder() at {} does not set redirect(Policy::none()). \
                 Signed requests must not be forwarded to a redirect target.",
                path
            );
        }
    }
}

#[test]
fn constant_time_uses_subtle_crate() {
    let files = production_source_files();

    for (path, content) in &files {
        let prod_content = production_lines(content);

        if prod_content.contains("fn constant_time_eq") {
            assert!(
                prod_content.contains("subtle::") || prod_content.contains("use subtle"),
                "File {} contains constant_time_eq that doesn't use the subtle crate.",
                path
            );
        }
    }
}

#[test]
fn vault_nonces_come_from_os_rng() {
    let files = production_source_files();
    let mut checked = false;

    for (path, content) in &files {
        if !path.ends_with("vault.rs") {
            continue;
        }
        checked = true;
        let code = code_lines(content);

        assert!(
            code.contains("OsRng"),
            "vault at {} must draw nonces from the OS RNG",
            path
        );
        assert!(
            !code.contains("thread_rng") && !code.contains("SeedableRng"),
            "vault at {} must not use a userspace or seeded RNG for nonces",
            path
        );
    }

    assert!(checked, "vault.rs not found");
}

#[test]
fn not_registered_error_carries_no_order() {
    let variant_re = Regex::new(r"NotRegistered\s*,").unwrap();
    let files = production_source_files();

    for (path, content) in &files {
        if !path.ends_with("error.rs") || !content.contains("NotRegistered") {
            continue;
        }
        let prod_content = production_lines(content);
        assert!(
            variant_re.is_match(&prod_content),
            "NotRegistered at {} must be a unit variant so the message cannot include the order.",
            path
        );
        assert!(
            prod_content.contains("#[error(\"not registered\")]"),
            "NotRegistered at {} must render as exactly \"not registered\".",
            path
        );
    }
}

#[test]
fn merchant_database_is_owner_only() {
    let files = production_source_files();

    for (path, content) in &files {
        let prod_content = production_lines(content);
        if !prod_content.contains("rusqlite::Connection::open") {
            continue;
        }
        assert!(
            prod_content.contains("from_mode(0o600)"),
            "SQLite database opened at {} without restricting permissions to 0600.",
            path
        );
    }
}

#[test]
fn library_code_does_not_print() {
    let print_re = Regex::new(r"\b(e?println|e?print|dbg)!\(").unwrap();
    let files = production_source_files();

    for (path, content) in &files {
        if path.contains("/bin/") || path.contains("\\bin\\") || path.ends_with("main.rs") {
            continue;
        }
        let code = code_lines(content);
        for line in code.lines() {
            assert!(
                !print_re.is_match(line),
                "Library code at {} writes to stdout/stderr: {}. Use tracing instead.",
                path,
                line.trim()
            );
        }
    }
}

#[test]
fn key_holding_structs_redact_debug() {
    let derive_re = Regex::new(r"#\[derive\([^)]*Debug[^)]*\)\]\s*pub struct (RedsysConfig|MerchantRecord|NotificationVerifier)\b").unwrap();
    let files = production_source_files();

    for (path, content) in &files {
        let prod_content = production_lines(content);
        assert!(
            !derive_re.is_match(&prod_content),
            "Struct holding keys at {} derives Debug. Implement Debug with [REDACTED] fields.",
            path
        );
    }
}
