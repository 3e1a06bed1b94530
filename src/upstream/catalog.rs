//! The fixed tool catalog and its mapping onto the OpenProject API v3.
//!
//! Request building is pure: it only turns parameters into a method, path,
//! query and body. Parameter problems surface as `InvalidParams` before
//! any network traffic happens.

use chrono::{Datelike, NaiveDate, Utc, Weekday};
use reqwest::Method;
use serde::Serialize;
use serde_json::{Value, json};

use super::UpstreamError;
use crate::db::Params;

/// Template used to render report-style tools.
pub const WEEKLY_REPORT_TEMPLATE: &str = "weekly_report";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    ListProjects,
    GetProject,
    ListWorkPackages,
    GetWorkPackage,
    CreateWorkPackage,
    UpdateWorkPackage,
    LogTime,
    WeeklyReport,
}

/// One upstream HTTP call, relative to the configured endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl UpstreamRequest {
    fn get(path: String) -> Self {
        Self {
            method: Method::GET,
            path,
            query: vec![],
            body: None,
        }
    }

    fn with_body(method: Method, path: String, body: Value) -> Self {
        Self {
            method,
            path,
            query: vec![],
            body: Some(body),
        }
    }

    fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }
}

/// Catalog entry as listed to callers.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct ToolInfo {
    #[schema(example = "list-projects")]
    pub name: String,
    pub description: String,
    pub required_params: Vec<String>,
    pub optional_params: Vec<String>,
    /// Whether results are rendered through a template.
    pub report: bool,
}

impl Tool {
    pub const ALL: [Tool; 8] = [
        Tool::ListProjects,
        Tool::GetProject,
        Tool::ListWorkPackages,
        Tool::GetWorkPackage,
        Tool::CreateWorkPackage,
        Tool::UpdateWorkPackage,
        Tool::LogTime,
        Tool::WeeklyReport,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Tool::ListProjects => "list-projects",
            Tool::GetProject => "get-project",
            Tool::ListWorkPackages => "list-work-packages",
            Tool::GetWorkPackage => "get-work-package",
            Tool::CreateWorkPackage => "create-work-package",
            Tool::UpdateWorkPackage => "update-work-package",
            Tool::LogTime => "log-time",
            Tool::WeeklyReport => "weekly-report",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Tool::ListProjects => "List projects visible to the configured account",
            Tool::GetProject => "Fetch a single project",
            Tool::ListWorkPackages => "List work packages of a project",
            Tool::GetWorkPackage => "Fetch a single work package",
            Tool::CreateWorkPackage => "Create a work package in a project",
            Tool::UpdateWorkPackage => "Update subject or description of a work package",
            Tool::LogTime => "Log spent time on a work package",
            Tool::WeeklyReport => "Render a weekly report of work packages updated in an ISO week",
        }
    }

    /// Case-insensitive; `-` and `_` are interchangeable.
    pub fn parse(tool_desc: &str) -> Option<Tool> {
        let normalized = tool_desc.trim().to_ascii_lowercase().replace('_', "-");
        if let Some(tool) = Tool::ALL.iter().find(|t| t.name() == normalized) {
            return Some(*tool);
        }
        match normalized.as_str() {
            "fetch-weekly-report" | "get-weekly-report" => Some(Tool::WeeklyReport),
            "get-work-packages" => Some(Tool::ListWorkPackages),
            "get-projects" => Some(Tool::ListProjects),
            "log-time-entry" | "create-time-entry" => Some(Tool::LogTime),
            _ => None,
        }
    }

    pub fn required_params(&self) -> &'static [&'static str] {
        match self {
            Tool::ListProjects => &[],
            Tool::GetProject | Tool::ListWorkPackages | Tool::WeeklyReport => &["project_id"],
            Tool::GetWorkPackage => &["work_package_id"],
            Tool::CreateWorkPackage => &["project_id", "subject"],
            Tool::UpdateWorkPackage => &["work_package_id", "lock_version"],
            Tool::LogTime => &["work_package_id", "hours"],
        }
    }

    pub fn optional_params(&self) -> &'static [&'static str] {
        match self {
            Tool::ListProjects => &["page_size", "offset"],
            Tool::GetProject | Tool::GetWorkPackage => &[],
            Tool::ListWorkPackages => &["filters", "page_size", "offset"],
            Tool::CreateWorkPackage => &["description", "type_id"],
            Tool::UpdateWorkPackage => &["subject", "description"],
            Tool::LogTime => &["spent_on", "comment"],
            Tool::WeeklyReport => &["week"],
        }
    }

    /// Report tools have their result rendered through a template.
    pub fn is_report(&self) -> bool {
        self.template_name().is_some()
    }

    pub fn template_name(&self) -> Option<&'static str> {
        match self {
            Tool::WeeklyReport => Some(WEEKLY_REPORT_TEMPLATE),
            _ => None,
        }
    }

    pub fn info(&self) -> ToolInfo {
        ToolInfo {
            name: self.name().to_string(),
            description: self.description().to_string(),
            required_params: self.required_params().iter().map(|p| p.to_string()).collect(),
            optional_params: self.optional_params().iter().map(|p| p.to_string()).collect(),
            report: self.is_report(),
        }
    }

    /// Build the upstream call for the given (already merged) parameters.
    pub fn build_request(&self, params: &Params) -> Result<UpstreamRequest, UpstreamError> {
        for key in self.required_params() {
            if params.get(*key).is_none_or(Value::is_null) {
                return Err(UpstreamError::InvalidParams(format!(
                    "missing required parameter '{}' for {}",
                    key,
                    self.name()
                )));
            }
        }

        let request = match self {
            Tool::ListProjects => paged(UpstreamRequest::get("/api/v3/projects".into()), params)?,
            Tool::GetProject => {
                UpstreamRequest::get(format!("/api/v3/projects/{}", id_param(params, "project_id")?))
            }
            Tool::ListWorkPackages => {
                let path = format!(
                    "/api/v3/projects/{}/work_packages",
                    id_param(params, "project_id")?
                );
                let mut request = paged(UpstreamRequest::get(path), params)?;
                match params.get("filters") {
                    None | Some(Value::Null) => {}
                    Some(Value::String(raw)) => request = request.query("filters", raw.clone()),
                    Some(filters @ Value::Array(_)) => {
                        request = request.query("filters", filters.to_string())
                    }
                    Some(_) => {
                        return Err(UpstreamError::InvalidParams(
                            "'filters' must be a JSON array or string".into(),
                        ));
                    }
                }
                request
            }
            Tool::GetWorkPackage => UpstreamRequest::get(format!(
                "/api/v3/work_packages/{}",
                id_param(params, "work_package_id")?
            )),
            Tool::CreateWorkPackage => {
                let project_id = id_param(params, "project_id")?;
                let mut body = json!({ "subject": required_str(params, "subject")? });
                if let Some(description) = optional_str(params, "description")? {
                    body["description"] = json!({ "format": "markdown", "raw": description });
                }
                if params.get("type_id").is_some_and(|v| !v.is_null()) {
                    let type_id = id_param(params, "type_id")?;
                    body["_links"] = json!({ "type": { "href": format!("/api/v3/types/{}", type_id) } });
                }
                UpstreamRequest::with_body(
                    Method::POST,
                    format!("/api/v3/projects/{}/work_packages", project_id),
                    body,
                )
            }
            Tool::UpdateWorkPackage => {
                let id = id_param(params, "work_package_id")?;
                let lock_version = int_param(params, "lock_version")?;
                let mut body = json!({ "lockVersion": lock_version });
                let subject = optional_str(params, "subject")?;
                let description = optional_str(params, "description")?;
                if subject.is_none() && description.is_none() {
                    return Err(UpstreamError::InvalidParams(
                        "update-work-package needs 'subject' or 'description'".into(),
                    ));
                }
                if let Some(subject) = subject {
                    body["subject"] = json!(subject);
                }
                if let Some(description) = description {
                    body["description"] = json!({ "format": "markdown", "raw": description });
                }
                UpstreamRequest::with_body(
                    Method::PATCH,
                    format!("/api/v3/work_packages/{}", id),
                    body,
                )
            }
            Tool::LogTime => {
                let id = id_param(params, "work_package_id")?;
                let hours = hours_param(params)?;
                let spent_on = match optional_str(params, "spent_on")? {
                    Some(date) => NaiveDate::parse_from_str(date, "%Y-%m-%d")
                        .map_err(|_| {
                            UpstreamError::InvalidParams(format!(
                                "'spent_on' must be YYYY-MM-DD, got '{}'",
                                date
                            ))
                        })?,
                    None => Utc::now().date_naive(),
                };
                let mut body = json!({
                    "hours": format!("PT{}H", hours),
                    "spentOn": spent_on.format("%Y-%m-%d").to_string(),
                    "_links": { "workPackage": { "href": format!("/api/v3/work_packages/{}", id) } }
                });
                if let Some(comment) = optional_str(params, "comment")? {
                    body["comment"] = json!({ "format": "plain", "raw": comment });
                }
                UpstreamRequest::with_body(Method::POST, "/api/v3/time_entries".into(), body)
            }
            Tool::WeeklyReport => {
                let project_id = id_param(params, "project_id")?;
                let week = ReportWeek::from_params(params)?;
                let filters = json!([{
                    "updatedAt": {
                        "operator": "<>d",
                        "values": [week.start.to_string(), week.end.to_string()]
                    }
                }]);
                UpstreamRequest::get(format!("/api/v3/projects/{}/work_packages", project_id))
                    .query("filters", filters.to_string())
                    .query("pageSize", "500")
            }
        };
        Ok(request)
    }
}

// =============================================================================
// ISO weeks
// =============================================================================

/// An ISO week, Monday through Sunday.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportWeek {
    /// Canonical `YYYY-Www` label.
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ReportWeek {
    /// The ISO week containing `date`.
    pub fn containing(date: NaiveDate) -> Self {
        let iso = date.iso_week();
        let start = date - chrono::Duration::days(date.weekday().num_days_from_monday() as i64);
        Self {
            label: format!("{}-W{:02}", iso.year(), iso.week()),
            start,
            end: start + chrono::Duration::days(6),
        }
    }

    /// Parse `YYYY-Www` (`W7` and `W07` both accepted) or `current`.
    pub fn parse(week: &str) -> Result<Self, UpstreamError> {
        let week = week.trim();
        if week.is_empty() || week.eq_ignore_ascii_case("current") {
            return Ok(Self::containing(Utc::now().date_naive()));
        }
        let invalid = || {
            UpstreamError::InvalidParams(format!(
                "'week' must look like 2025-W07 or 'current', got '{}'",
                week
            ))
        };
        let (year, number) = week.split_once(['-']).ok_or_else(invalid)?;
        let number = number
            .strip_prefix(['W', 'w'])
            .ok_or_else(invalid)?;
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let number: u32 = number.parse().map_err(|_| invalid())?;
        let start = NaiveDate::from_isoywd_opt(year, number, Weekday::Mon).ok_or_else(invalid)?;
        Ok(Self::containing(start))
    }

    pub fn from_params(params: &Params) -> Result<Self, UpstreamError> {
        match params.get("week") {
            None | Some(Value::Null) => Self::parse("current"),
            Some(Value::String(week)) => Self::parse(week),
            Some(_) => Err(UpstreamError::InvalidParams("'week' must be a string".into())),
        }
    }
}

// =============================================================================
// Parameter helpers
// =============================================================================

fn paged(mut request: UpstreamRequest, params: &Params) -> Result<UpstreamRequest, UpstreamError> {
    if params.get("page_size").is_some_and(|v| !v.is_null()) {
        request = request.query("pageSize", id_param(params, "page_size")?.to_string());
    }
    if params.get("offset").is_some_and(|v| !v.is_null()) {
        request = request.query("offset", id_param(params, "offset")?.to_string());
    }
    Ok(request)
}

fn int_param(params: &Params, key: &str) -> Result<i64, UpstreamError> {
    let value = params.get(key);
    let parsed = match value {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        UpstreamError::InvalidParams(format!("'{}' must be an integer", key))
    })
}

/// Positive integer id, given as number or numeric string.
fn id_param(params: &Params, key: &str) -> Result<u64, UpstreamError> {
    match int_param(params, key) {
        Ok(n) if n > 0 => Ok(n as u64),
        _ => Err(UpstreamError::InvalidParams(format!(
            "'{}' must be a positive integer",
            key
        ))),
    }
}

fn hours_param(params: &Params) -> Result<f64, UpstreamError> {
    let hours = match params.get("hours") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    match hours {
        Some(h) if h > 0.0 && h <= 24.0 => Ok(h),
        _ => Err(UpstreamError::InvalidParams(
            "'hours' must be a number between 0 and 24".into(),
        )),
    }
}

fn optional_str<'p>(params: &'p Params, key: &str) -> Result<Option<&'p str>, UpstreamError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(UpstreamError::InvalidParams(format!(
            "'{}' must be a string",
            key
        ))),
    }
}

fn required_str<'p>(params: &'p Params, key: &str) -> Result<&'p str, UpstreamError> {
    match optional_str(params, key)? {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(UpstreamError::InvalidParams(format!(
            "'{}' must not be empty",
            key
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(value: Value) -> Params {
        match value {
            Value::Object(map) => map,
            _ => panic!("params must be an object"),
        }
    }

    #[test]
    fn parse_accepts_case_separators_and_aliases() {
        assert_eq!(Tool::parse("list-projects"), Some(Tool::ListProjects));
        assert_eq!(Tool::parse("LIST_PROJECTS"), Some(Tool::ListProjects));
        assert_eq!(Tool::parse(" fetch_weekly_report "), Some(Tool::WeeklyReport));
        assert_eq!(Tool::parse("get_work_packages"), Some(Tool::ListWorkPackages));
        assert_eq!(Tool::parse("rm-rf"), None);
        assert_eq!(Tool::parse(""), None);
    }

    #[test]
    fn every_tool_name_round_trips() {
        for tool in Tool::ALL {
            assert_eq!(Tool::parse(tool.name()), Some(tool));
        }
    }

    #[test]
    fn only_weekly_report_is_a_report() {
        let reports: Vec<Tool> = Tool::ALL.into_iter().filter(Tool::is_report).collect();
        assert_eq!(reports, vec![Tool::WeeklyReport]);
        assert_eq!(Tool::WeeklyReport.template_name(), Some(WEEKLY_REPORT_TEMPLATE));
    }

    #[test]
    fn list_projects_needs_no_params() {
        let request = Tool::ListProjects.build_request(&Params::new()).unwrap();
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.path, "/api/v3/projects");
        assert!(request.query.is_empty());
    }

    #[test]
    fn missing_required_param_is_invalid() {
        let err = Tool::GetProject.build_request(&Params::new()).unwrap_err();
        assert!(matches!(err, UpstreamError::InvalidParams(m) if m.contains("project_id")));
    }

    #[test]
    fn ids_accept_numeric_strings_but_not_garbage() {
        let request = Tool::GetWorkPackage
            .build_request(&params(json!({"work_package_id": "42"})))
            .unwrap();
        assert_eq!(request.path, "/api/v3/work_packages/42");

        assert!(
            Tool::GetWorkPackage
                .build_request(&params(json!({"work_package_id": "../admin"})))
                .is_err()
        );
        assert!(
            Tool::GetWorkPackage
                .build_request(&params(json!({"work_package_id": 0})))
                .is_err()
        );
    }

    #[test]
    fn create_work_package_builds_hal_body() {
        let request = Tool::CreateWorkPackage
            .build_request(&params(json!({
                "project_id": 3,
                "subject": "Fix login",
                "description": "Steps...",
                "type_id": 1
            })))
            .unwrap();

        assert_eq!(request.method, Method::POST);
        assert_eq!(request.path, "/api/v3/projects/3/work_packages");
        let body = request.body.unwrap();
        assert_eq!(body["subject"], "Fix login");
        assert_eq!(body["description"]["raw"], "Steps...");
        assert_eq!(body["_links"]["type"]["href"], "/api/v3/types/1");
    }

    #[test]
    fn update_work_package_requires_a_change() {
        let err = Tool::UpdateWorkPackage
            .build_request(&params(json!({"work_package_id": 5, "lock_version": 2})))
            .unwrap_err();
        assert!(matches!(err, UpstreamError::InvalidParams(_)));

        let request = Tool::UpdateWorkPackage
            .build_request(&params(json!({
                "work_package_id": 5,
                "lock_version": 2,
                "subject": "Renamed"
            })))
            .unwrap();
        assert_eq!(request.method, Method::PATCH);
        assert_eq!(request.body.unwrap()["lockVersion"], 2);
    }

    #[test]
    fn log_time_formats_iso_duration() {
        let request = Tool::LogTime
            .build_request(&params(json!({
                "work_package_id": 9,
                "hours": 1.5,
                "spent_on": "2025-03-04",
                "comment": "review"
            })))
            .unwrap();
        let body = request.body.unwrap();
        assert_eq!(body["hours"], "PT1.5H");
        assert_eq!(body["spentOn"], "2025-03-04");
        assert_eq!(body["_links"]["workPackage"]["href"], "/api/v3/work_packages/9");

        assert!(
            Tool::LogTime
                .build_request(&params(json!({"work_package_id": 9, "hours": -1})))
                .is_err()
        );
    }

    #[test]
    fn list_work_packages_passes_filters_through() {
        let request = Tool::ListWorkPackages
            .build_request(&params(json!({
                "project_id": 1,
                "filters": [{"status": {"operator": "o", "values": []}}],
                "page_size": 20
            })))
            .unwrap();
        assert!(request.query.contains(&("pageSize".to_string(), "20".to_string())));
        assert!(request.query.iter().any(|(k, v)| k == "filters" && v.contains("status")));
    }

    #[test]
    fn weekly_report_filters_by_iso_week() {
        let request = Tool::WeeklyReport
            .build_request(&params(json!({"project_id": 1, "week": "2025-W07"})))
            .unwrap();
        let filters = &request.query.iter().find(|(k, _)| k == "filters").unwrap().1;
        assert!(filters.contains("2025-02-10"));
        assert!(filters.contains("2025-02-16"));
    }

    #[test]
    fn week_parsing() {
        let week = ReportWeek::parse("2025-W7").unwrap();
        assert_eq!(week.label, "2025-W07");
        assert_eq!(week.start, NaiveDate::from_ymd_opt(2025, 2, 10).unwrap());
        assert_eq!(week.end, NaiveDate::from_ymd_opt(2025, 2, 16).unwrap());

        // ISO week 1 of 2025 starts in December 2024.
        let first = ReportWeek::parse("2025-W01").unwrap();
        assert_eq!(first.start, NaiveDate::from_ymd_opt(2024, 12, 30).unwrap());

        assert!(ReportWeek::parse("2025-W54").is_err());
        assert!(ReportWeek::parse("2025/07").is_err());
        assert!(ReportWeek::parse("current").is_ok());
    }
}
