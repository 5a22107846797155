//! Stack file validation.
//!
//! Validation runs before any remote call: a stack that fails here never
//! opens a transaction. Errors are collected in one pass so the CLI can
//! report all of them at once.

use crate::error::{ConfigError, LbStackError, Result};
use std::collections::HashSet;
use tracing::debug;

use super::spec::{
    AclBlock, BackendSpec, BindBlock, FrontendSpec, HttpRuleBlock, ServerBlock, StackConfig,
    TcpRuleBlock,
};
use crate::model::{SubResourceKind, http_action_fields};

/// Validator for stack files.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all problems found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

/// Rule types accepted by `tcp-request` and `tcp-response` rules.
const TCP_RULE_TYPES: &[&str] = &["connection", "content", "inspect-delay", "session"];

/// Action parameters that must be present for an HTTP rule type.
fn required_http_params(rule_type: &str) -> &'static [&'static str] {
    match rule_type {
        "add-header" | "set-header" => &["hdr_name", "hdr_format"],
        "del-header" => &["hdr_name"],
        "replace-header" | "replace-value" => &["hdr_name", "hdr_match", "hdr_format"],
        "redirect" => &["redir_type", "redir_value"],
        "set-var" => &["var_scope", "var_name", "var_expr"],
        "unset-var" => &["var_scope", "var_name"],
        "set-path" => &["path_fmt"],
        "replace-path" => &["path_match", "path_fmt"],
        "set-uri" => &["uri_fmt"],
        "replace-uri" => &["uri_match", "uri_fmt"],
        "set-method" => &["method_fmt"],
        "set-status" => &["status"],
        "use-service" => &["service_name"],
        "lua" => &["lua_action"],
        _ => &[],
    }
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a stack file.
    ///
    /// # Errors
    ///
    /// Returns the first validation error if any check fails.
    pub fn validate(&self, config: &StackConfig) -> Result<ValidationResult> {
        let result = self.check(config);

        if result.errors.is_empty() {
            debug!("Stack validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(LbStackError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }))
        }
    }

    /// Runs every check and returns all findings without failing.
    #[must_use]
    pub fn check(&self, config: &StackConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_dataplane(config, &mut result);
        Self::validate_stack(config, &mut result);

        result
    }

    fn validate_dataplane(config: &StackConfig, result: &mut ValidationResult) {
        let url = &config.dataplane.url;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            result.push("dataplane.url", format!("URL must use http or https: '{url}'"));
        }

        if config.dataplane.username.is_empty() {
            result.push("dataplane.username", "Username cannot be empty");
        }

        if config.dataplane.timeout_secs == 0 {
            result.push("dataplane.timeout_secs", "Timeout must be at least 1 second");
        }

        if config.dataplane.password.is_some() {
            result.warnings.push(format!(
                "dataplane.password: inline password in stack file, prefer {}",
                config.dataplane.password_env
            ));
        }
    }

    fn validate_stack(config: &StackConfig, result: &mut ValidationResult) {
        let stack = &config.stack;
        if !is_valid_name(&stack.name) {
            result.push(
                "stack.name",
                format!(
                    "Stack name '{}' is invalid. Must be lowercase alphanumeric with hyphens or underscores.",
                    stack.name
                ),
            );
        }

        if stack.backend.is_none() && stack.frontend.is_none() {
            result.push("stack", "Stack declares neither a backend nor a frontend");
        }

        if let Some(backend) = &stack.backend {
            Self::validate_backend(backend, result);
        }

        if let Some(frontend) = &stack.frontend {
            Self::validate_frontend(frontend, stack.backend.as_ref(), result);
        }
    }

    fn validate_backend(backend: &BackendSpec, result: &mut ValidationResult) {
        let prefix = "stack.backend";
        check_section_name(&backend.name, prefix, result);

        validate_acls(&backend.acls, &format!("{prefix}.acls"), result);
        validate_http_rules(
            SubResourceKind::HttpRequestRule,
            &backend.http_request_rules,
            &format!("{prefix}.http_request_rules"),
            result,
        );
        validate_http_rules(
            SubResourceKind::HttpResponseRule,
            &backend.http_response_rules,
            &format!("{prefix}.http_response_rules"),
            result,
        );
        validate_tcp_rules(
            &backend.tcp_request_rules,
            &format!("{prefix}.tcp_request_rules"),
            result,
        );
        validate_tcp_rules(
            &backend.tcp_response_rules,
            &format!("{prefix}.tcp_response_rules"),
            result,
        );
        validate_servers(&backend.servers, &format!("{prefix}.servers"), result);

        if backend.servers.is_empty() {
            result
                .warnings
                .push(format!("{prefix}: backend '{}' has no servers", backend.name));
        }
    }

    fn validate_frontend(
        frontend: &FrontendSpec,
        backend: Option<&BackendSpec>,
        result: &mut ValidationResult,
    ) {
        let prefix = "stack.frontend";
        check_section_name(&frontend.name, prefix, result);

        if let (Some(default_backend), Some(backend)) = (&frontend.default_backend, backend)
            && default_backend != &backend.name
        {
            result.warnings.push(format!(
                "{prefix}.default_backend: '{default_backend}' is not managed by this stack (backend is '{}')",
                backend.name
            ));
        }

        validate_acls(&frontend.acls, &format!("{prefix}.acls"), result);
        validate_http_rules(
            SubResourceKind::HttpRequestRule,
            &frontend.http_request_rules,
            &format!("{prefix}.http_request_rules"),
            result,
        );
        validate_http_rules(
            SubResourceKind::HttpResponseRule,
            &frontend.http_response_rules,
            &format!("{prefix}.http_response_rules"),
            result,
        );
        validate_tcp_rules(
            &frontend.tcp_request_rules,
            &format!("{prefix}.tcp_request_rules"),
            result,
        );
        validate_binds(&frontend.binds, &format!("{prefix}.binds"), result);

        if frontend.binds.is_empty() {
            result
                .warnings
                .push(format!("{prefix}: frontend '{}' has no binds", frontend.name));
        }
    }
}

/// Checks resolved indices (explicit, or declaration position) for
/// negatives and duplicates.
fn validate_indices<I>(indices: I, prefix: &str, result: &mut ValidationResult)
where
    I: IntoIterator<Item = Option<i64>>,
{
    let mut seen = HashSet::new();
    for (position, explicit) in indices.into_iter().enumerate() {
        let index = explicit.unwrap_or_else(|| i64::try_from(position).unwrap_or(i64::MAX));
        if index < 0 {
            result.push(
                format!("{prefix}[{position}].index"),
                format!("Index must not be negative: {index}"),
            );
        } else if !seen.insert(index) {
            result.push(
                format!("{prefix}[{position}].index"),
                format!("Duplicate index {index}"),
            );
        }
    }

    let highest = seen.iter().copied().max();
    if highest.is_some_and(|max| usize::try_from(max).ok().is_none_or(|max| max >= seen.len())) {
        result.warnings.push(format!(
            "{prefix}: indices leave gaps; HAProxy stores them contiguously, so these entries are planned again on every apply"
        ));
    }
}

fn validate_names<'a, I>(names: I, prefix: &str, result: &mut ValidationResult)
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    for (position, name) in names.into_iter().enumerate() {
        if name.is_empty() {
            result.push(format!("{prefix}[{position}].name"), "Name cannot be empty");
        } else if !seen.insert(name) {
            result.push(
                format!("{prefix}[{position}].name"),
                format!("Duplicate name: {name}"),
            );
        }
    }
}

fn validate_acls(acls: &[AclBlock], prefix: &str, result: &mut ValidationResult) {
    validate_names(acls.iter().map(|acl| acl.name.as_str()), prefix, result);
    validate_indices(acls.iter().map(|acl| acl.index), prefix, result);

    for (i, acl) in acls.iter().enumerate() {
        if acl.criterion.is_empty() {
            result.push(format!("{prefix}[{i}].criterion"), "Criterion cannot be empty");
        }
    }
}

fn validate_condition(
    cond: Option<&str>,
    cond_test: Option<&str>,
    field: &str,
    result: &mut ValidationResult,
) {
    match (cond, cond_test) {
        (Some("if" | "unless"), Some(test)) if !test.is_empty() => {}
        (Some("if" | "unless"), _) => {
            result.push(format!("{field}.cond_test"), "cond requires a cond_test");
        }
        (Some(other), _) => {
            result.push(
                format!("{field}.cond"),
                format!("cond must be 'if' or 'unless', got '{other}'"),
            );
        }
        (None, Some(_)) => {
            result.push(format!("{field}.cond"), "cond_test requires a cond");
        }
        (None, None) => {}
    }
}

fn validate_http_rules(
    kind: SubResourceKind,
    rules: &[HttpRuleBlock],
    prefix: &str,
    result: &mut ValidationResult,
) {
    validate_indices(rules.iter().map(|rule| rule.index), prefix, result);

    for (i, rule) in rules.iter().enumerate() {
        let field = format!("{prefix}[{i}]");
        if rule.rule_type.is_empty() {
            result.push(format!("{field}.type"), "Rule type cannot be empty");
            continue;
        }

        validate_condition(rule.cond.as_deref(), rule.cond_test.as_deref(), &field, result);

        if http_action_fields(kind, &rule.rule_type).is_none() {
            result.warnings.push(format!(
                "{field}.type: '{}' is not a known {kind} type, all fields are compared",
                rule.rule_type
            ));
        }

        for param in required_http_params(&rule.rule_type) {
            if rule.params.get(*param).is_none_or(serde_json::Value::is_null) {
                result.push(
                    format!("{field}.{param}"),
                    format!("'{}' rule requires {param}", rule.rule_type),
                );
            }
        }
    }
}

fn validate_tcp_rules(rules: &[TcpRuleBlock], prefix: &str, result: &mut ValidationResult) {
    validate_indices(rules.iter().map(|rule| rule.index), prefix, result);

    for (i, rule) in rules.iter().enumerate() {
        let field = format!("{prefix}[{i}]");
        if !TCP_RULE_TYPES.contains(&rule.rule_type.as_str()) {
            result.push(
                format!("{field}.type"),
                format!(
                    "TCP rule type must be one of {}, got '{}'",
                    TCP_RULE_TYPES.join(", "),
                    rule.rule_type
                ),
            );
            continue;
        }

        if rule.rule_type == "inspect-delay" {
            if !rule.params.contains_key("timeout") {
                result.push(format!("{field}.timeout"), "inspect-delay requires a timeout");
            }
        } else if rule.action.as_deref().is_none_or(str::is_empty) {
            result.push(
                format!("{field}.action"),
                format!("'{}' rule requires an action", rule.rule_type),
            );
        }

        validate_condition(rule.cond.as_deref(), rule.cond_test.as_deref(), &field, result);
    }
}

fn validate_servers(servers: &[ServerBlock], prefix: &str, result: &mut ValidationResult) {
    validate_names(servers.iter().map(|s| s.name.as_str()), prefix, result);
    validate_indices(servers.iter().map(|s| s.index), prefix, result);

    for (i, server) in servers.iter().enumerate() {
        if server.address.is_empty() {
            result.push(format!("{prefix}[{i}].address"), "Address cannot be empty");
        }
        if server.port == Some(0) {
            result.push(format!("{prefix}[{i}].port"), "Port must be between 1 and 65535");
        }
        if server.weight.is_some_and(|w| !(0..=256).contains(&w)) {
            result.push(format!("{prefix}[{i}].weight"), "Weight must be between 0 and 256");
        }
    }
}

fn validate_binds(binds: &[BindBlock], prefix: &str, result: &mut ValidationResult) {
    validate_names(binds.iter().map(|b| b.name.as_str()), prefix, result);
    validate_indices(binds.iter().map(|b| b.index), prefix, result);

    for (i, bind) in binds.iter().enumerate() {
        if bind.address.is_none() && bind.port.is_none() {
            result.push(format!("{prefix}[{i}]"), "Bind needs an address or a port");
        }
        if bind.port == Some(0) {
            result.push(format!("{prefix}[{i}].port"), "Port must be between 1 and 65535");
        }
        if let (Some(start), Some(end)) = (bind.port, bind.port_range_end)
            && end < start
        {
            result.push(
                format!("{prefix}[{i}].port_range_end"),
                format!("Port range end {end} is below port {start}"),
            );
        }
    }
}

fn check_section_name(name: &str, prefix: &str, result: &mut ValidationResult) {
    if name.is_empty() {
        result.push(format!("{prefix}.name"), "Name cannot be empty");
    } else if !is_valid_section_name(name) {
        result.push(
            format!("{prefix}.name"),
            format!("'{name}' is not a valid HAProxy section name"),
        );
    }
}

/// Validates that a stack name is usable as a file name.
/// Names must be lowercase alphanumeric with hyphens or underscores, starting
/// with a letter.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {}
        _ => return false,
    }

    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        && !name.ends_with(['-', '_'])
}

/// HAProxy accepts letters, digits, `-`, `_`, `.` and `:` in section names.
fn is_valid_section_name(name: &str) -> bool {
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
}

impl ValidationResult {
    fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;

    fn parse(stack: &str) -> StackConfig {
        let yaml = format!("dataplane:\n  url: http://127.0.0.1:5555\nstack:\n{stack}");
        ConfigParser::new().parse_yaml(&yaml, None).unwrap()
    }

    fn fields(result: &ValidationResult) -> Vec<&str> {
        result.errors.iter().map(|e| e.field.as_str()).collect()
    }

    #[test]
    fn test_valid_name() {
        assert!(is_valid_name("web"));
        assert!(is_valid_name("web-prod_2"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("Web"));
        assert!(!is_valid_name("2web"));
        assert!(!is_valid_name("web-"));
        assert!(is_valid_section_name("web_be.v2"));
        assert!(!is_valid_section_name("web be"));
    }

    #[test]
    fn test_valid_stack() {
        let config = parse(
            r"  name: web
  backend:
    name: web_be
    servers:
      - name: app1
        address: 10.0.0.1
        port: 8080
  frontend:
    name: web_fe
    default_backend: web_be
    binds:
      - name: http
        port: 80
",
        );
        let result = ConfigValidator::new().validate(&config).unwrap();
        assert!(result.is_valid());
        assert_eq!(result.warning_count(), 0);
    }

    #[test]
    fn test_empty_stack_rejected() {
        let config = parse("  name: web\n");
        let err = ConfigValidator::new().validate(&config).unwrap_err();
        assert!(matches!(
            err,
            LbStackError::Config(ConfigError::ValidationError { field: Some(ref f), .. }) if f == "stack"
        ));
    }

    #[test]
    fn test_duplicate_and_negative_indices() {
        let config = parse(
            r"  name: web
  backend:
    name: web_be
    acls:
      - name: a
        criterion: path_beg
        value: /a
      - name: b
        criterion: path_beg
        value: /b
        index: 0
      - name: c
        criterion: path_beg
        value: /c
        index: -1
",
        );
        let result = ConfigValidator::new().check(&config);
        assert_eq!(
            fields(&result),
            vec!["stack.backend.acls[1].index", "stack.backend.acls[2].index"]
        );
    }

    #[test]
    fn test_index_gaps_are_allowed() {
        let config = parse(
            r"  name: web
  backend:
    name: web_be
    http_request_rules:
      - type: allow
        index: 3
      - type: deny
        index: 10
",
        );
        let result = ConfigValidator::new().check(&config);
        assert!(result.is_valid());
        assert_eq!(result.warning_count(), 1);
        assert!(result.warnings[0].contains("http_request_rules"));
    }

    #[test]
    fn test_duplicate_names() {
        let config = parse(
            r"  name: web
  backend:
    name: web_be
    servers:
      - name: app
        address: 10.0.0.1
      - name: app
        address: 10.0.0.2
",
        );
        let result = ConfigValidator::new().check(&config);
        assert_eq!(fields(&result), vec!["stack.backend.servers[1].name"]);
    }

    #[test]
    fn test_rule_conditions_and_params() {
        let config = parse(
            r"  name: web
  frontend:
    name: web_fe
    binds:
      - name: http
        port: 80
    http_request_rules:
      - type: set-header
        hdr_name: X-Test
      - type: deny
        cond: when
        cond_test: is_bad
      - type: allow
        cond_test: is_good
    tcp_request_rules:
      - type: content
      - type: inspect-delay
        timeout: 5000
",
        );
        let result = ConfigValidator::new().check(&config);
        assert_eq!(
            fields(&result),
            vec![
                "stack.frontend.http_request_rules[0].hdr_format",
                "stack.frontend.http_request_rules[1].cond",
                "stack.frontend.http_request_rules[2].cond",
                "stack.frontend.tcp_request_rules[0].action",
            ]
        );
    }

    #[test]
    fn test_unknown_http_type_warns() {
        let config = parse(
            r"  name: web
  backend:
    name: web_be
    servers:
      - name: app1
        address: 10.0.0.1
    http_request_rules:
      - type: do-resolve
        resolvers: dns
",
        );
        let result = ConfigValidator::new().check(&config);
        assert!(result.is_valid());
        assert_eq!(result.warning_count(), 1);
    }

    #[test]
    fn test_foreign_default_backend_warns() {
        let config = parse(
            r"  name: web
  backend:
    name: web_be
    servers:
      - name: app1
        address: 10.0.0.1
  frontend:
    name: web_fe
    default_backend: legacy_be
    binds:
      - name: http
        port: 80
",
        );
        let result = ConfigValidator::new().check(&config);
        assert!(result.is_valid());
        assert!(result.warnings[0].contains("legacy_be"));
    }

    #[test]
    fn test_dataplane_checks() {
        let mut config = parse("  name: web\n  backend:\n    name: web_be\n");
        config.dataplane.url = String::from("ftp://lb");
        config.dataplane.timeout_secs = 0;
        let result = ConfigValidator::new().check(&config);
        assert_eq!(
            fields(&result),
            vec!["dataplane.url", "dataplane.timeout_secs"]
        );
    }

    #[test]
    fn test_bind_port_range() {
        let config = parse(
            r"  name: web
  frontend:
    name: web_fe
    binds:
      - name: range
        port: 9000
        port_range_end: 8000
",
        );
        let result = ConfigValidator::new().check(&config);
        assert_eq!(fields(&result), vec!["stack.frontend.binds[0].port_range_end"]);
    }
}
