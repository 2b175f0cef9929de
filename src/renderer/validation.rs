//! WGSL validation using the naga library.

use anyhow::{Context, Result, anyhow};

/// Validate WGSL source code using naga's parser.
///
/// # Returns
/// The parsed naga Module on success, or an error with a numbered source
/// listing on failure.
///
/// # Example
/// ```ignore
/// let wgsl = "@compute @workgroup_size(64) fn main() {}";
/// validate_wgsl(wgsl)?;
/// ```
pub fn validate_wgsl(source: &str) -> Result<naga::Module> {
    naga::front::wgsl::parse_str(source)
        .map_err(|e| anyhow!("WGSL validation failed:\n{}", format_naga_error(source, &e)))
}

/// Validate WGSL and name the module that generated it on failure.
pub fn validate_wgsl_with_context(source: &str, context: &str) -> Result<naga::Module> {
    validate_wgsl(source).with_context(|| format!("{} generated invalid WGSL", context))
}

/// True when the module requests `enable` extensions that the front end may not know.
pub fn has_enable_directives(source: &str) -> bool {
    source
        .lines()
        .any(|line| line.trim_start().starts_with("enable "))
}

fn format_naga_error(source: &str, error: &naga::front::wgsl::ParseError) -> String {
    let mut output = String::new();

    output.push_str(&format!("  {}\n", error));

    output.push_str("\nGenerated WGSL:\n");
    output.push_str("---\n");
    for (line_num, line) in source.lines().enumerate() {
        output.push_str(&format!("{:4} | {}\n", line_num + 1, line));
    }
    output.push_str("---\n");

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_compute_wgsl() {
        let source = r#"
@group(0) @binding(0) var<storage, read_write> counter: array<atomic<u32>>;
var<workgroup> tile: array<u32, 64>;

@compute @workgroup_size(64, 1, 1)
fn main(@builtin(local_invocation_id) localId: vec3u) {
	tile[localId.x] = atomicAdd(&counter[0], 1u);
	workgroupBarrier();
}
"#;
        assert!(validate_wgsl(source).is_ok());
    }

    #[test]
    fn test_invalid_wgsl_syntax() {
        let source = "fn invalid() -> { return vec4f(1.0); }";
        assert!(validate_wgsl(source).is_err());
    }

    #[test]
    fn test_validate_with_context() {
        let result = validate_wgsl_with_context("invalid wgsl", "compute module");
        let err_msg = format!("{:#}", result.unwrap_err());
        assert!(err_msg.contains("compute module"));
    }

    #[test]
    fn test_detects_enable_directives() {
        assert!(has_enable_directives("enable f16;\nfn f() {}"));
        assert!(!has_enable_directives("fn enabled() {}"));
    }
}
