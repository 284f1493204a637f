//! Routing table loading and matching.
//!
//! The table is a TOML document holding an ordered list of `[[routes]]`.
//! A route matches a request when its domain was detected upstream or when
//! one of its keywords occurs as a word in the task description.

use std::path::Path;

use temper_contracts::{
    error::{TemperError, TemperResult},
    routing::{RouteEntry, RoutingRequest, RoutingTable},
};

/// Why a route was selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteMatch {
    Domain(String),
    Keyword(String),
}

impl RouteMatch {
    pub fn describe(&self, route: &RouteEntry) -> String {
        match self {
            RouteMatch::Domain(domain) => format!("{} (domain '{domain}')", route.agent),
            RouteMatch::Keyword(keyword) => format!("{} (keyword '{keyword}')", route.agent),
        }
    }
}

/// Parse and validate a routing table.
///
/// Returns `TemperError::Config` if the TOML is malformed, does not match
/// the `[[routes]]` schema, or routes an agent twice.
pub fn table_from_toml_str(s: &str) -> TemperResult<RoutingTable> {
    let table: RoutingTable = toml::from_str(s).map_err(|e| TemperError::Config {
        reason: format!("failed to parse routing TOML: {e}"),
    })?;
    table.validate()?;
    Ok(table)
}

pub fn table_from_file(path: &Path) -> TemperResult<RoutingTable> {
    let contents = std::fs::read_to_string(path).map_err(|e| TemperError::Config {
        reason: format!("failed to read routing file '{}': {e}", path.display()),
    })?;
    table_from_toml_str(&contents)
}

/// Lowercased alphanumeric words of `text`.
fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Match `route` against `request`. Domain matches win over keywords.
pub fn match_route(route: &RouteEntry, request: &RoutingRequest) -> Option<RouteMatch> {
    if request
        .detected_domains
        .iter()
        .any(|d| d.eq_ignore_ascii_case(&route.domain))
    {
        return Some(RouteMatch::Domain(route.domain.clone()));
    }
    let description = words(&request.task_description);
    route
        .keywords
        .iter()
        .find(|keyword| {
            // Multi-word keywords match as a contiguous phrase.
            let phrase = words(keyword);
            !phrase.is_empty() && description.windows(phrase.len()).any(|w| w == phrase.as_slice())
        })
        .map(|keyword| RouteMatch::Keyword(keyword.clone()))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use temper_contracts::{
        agent::TaskId,
        error::TemperError,
        routing::RoutingRequest,
    };

    use super::{match_route, table_from_file, table_from_toml_str, RouteMatch};

    const TABLE: &str = r#"
        [[routes]]
        agent = "backend-agent"
        domain = "backend"
        keywords = ["api", "database schema"]

        [[routes]]
        agent = "frontend-agent"
        domain = "frontend"
        keywords = ["ui"]
    "#;

    fn request(description: &str, domains: &[&str]) -> RoutingRequest {
        RoutingRequest {
            task_id: TaskId::new("task-route"),
            task_description: description.to_string(),
            detected_domains: domains.iter().map(|d| d.to_string()).collect(),
            completed: Default::default(),
            failed: Default::default(),
        }
    }

    #[test]
    fn test_domain_and_keyword_matches() {
        let table = table_from_toml_str(TABLE).unwrap();
        let backend = &table.routes[0];

        assert_eq!(
            match_route(backend, &request("anything", &["Backend"])),
            Some(RouteMatch::Domain("backend".to_string()))
        );
        assert_eq!(
            match_route(backend, &request("Expose an API for orders", &[])),
            Some(RouteMatch::Keyword("api".to_string()))
        );
        assert_eq!(
            match_route(backend, &request("Migrate the database schema", &[])),
            Some(RouteMatch::Keyword("database schema".to_string()))
        );
        // "rapid" contains "api" but is a different word.
        assert_eq!(match_route(backend, &request("rapid prototyping", &[])), None);
    }

    #[test]
    fn test_invalid_tables_rejected() {
        let err = table_from_toml_str("[[routes]]\nagent = \"a\"").unwrap_err();
        assert!(err.to_string().contains("failed to parse routing TOML"));

        let dup = "[[routes]]\nagent = \"a\"\ndomain = \"x\"\n[[routes]]\nagent = \"a\"\ndomain = \"y\"";
        assert!(matches!(table_from_toml_str(dup), Err(TemperError::Config { .. })));
    }

    #[test]
    fn test_table_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{TABLE}").unwrap();
        assert_eq!(table_from_file(file.path()).unwrap().routes.len(), 2);
        assert!(table_from_file(std::path::Path::new("/nonexistent/routes.toml")).is_err());
    }
}
