//! Schemas for the platform's request payloads.

use chrono::{Datelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::validation::field::Field;
use crate::validation::schema::Schema;

const ROLES: &[&str] = &["startup", "investor"];
const EMAIL_TLDS: &[&str] = &["com", "net", "org", "edu", "gov", "co", "io"];
const PASSWORD_SPECIALS: &[char] = &['!', '@', '#', '$', '%', '^', '&', '*'];
const FUNDING_STAGES: &[&str] = &[
    "pre-seed", "seed", "series-a", "series-b", "series-c", "growth", "ipo",
];
const EMPLOYEE_COUNTS: &[&str] = &["1-10", "11-50", "51-200", "201-500", "501-1000", "1000+"];
const TASK_PRIORITIES: &[&str] = &["low", "medium", "high", "urgent"];
const TASK_CATEGORIES: &[&str] = &["financial", "legal", "technical", "business", "other"];
const TICKET_SIZES: &[&str] = &["under-100k", "100k-500k", "500k-1m", "1m-5m", "5m-10m", "10m+"];
const SOCIAL_PLATFORMS: &[&str] = &[
    "linkedin", "twitter", "facebook", "website", "github", "instagram",
];
const DOCUMENT_TYPES: &[&str] = &["financial", "legal", "technical", "business", "other"];
const DOCUMENT_CATEGORIES: &[&str] = &["financial", "legal", "other"];
const SHARE_METHODS: &[&str] = &["email", "link"];

static FULL_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z\s]+$").expect("valid regex"));

/// Calendar year of the current UTC date.
pub fn current_year() -> i64 {
    i64::from(Utc::now().year())
}

fn password_complexity(value: &Value) -> Result<(), String> {
    let s = value.as_str().unwrap_or_default();
    let ok = s.chars().any(|c| c.is_ascii_lowercase())
        && s.chars().any(|c| c.is_ascii_uppercase())
        && s.chars().any(|c| c.is_ascii_digit())
        && s.chars().any(|c| PASSWORD_SPECIALS.contains(&c));
    if ok {
        Ok(())
    } else {
        Err("Password must contain at least one lowercase letter, one uppercase letter, one number, and one special character".to_string())
    }
}

pub fn register() -> Schema {
    Schema::object()
        .field(
            "email",
            Field::string()
                .email_with_tlds(EMAIL_TLDS)
                .max_len(100)
                .trim()
                .lowercase()
                .required(),
        )
        .field(
            "password",
            Field::string()
                .min_len(8)
                .max_len(128)
                .required()
                .check(password_complexity),
        )
        .field("role", Field::string().one_of(ROLES).required())
        .field(
            "fullName",
            Field::string()
                .min_len(2)
                .max_len(50)
                .pattern(
                    FULL_NAME_RE.clone(),
                    Some("Full name can only contain letters and spaces"),
                )
                .trim()
                .required(),
        )
}

pub fn login() -> Schema {
    Schema::object()
        .field(
            "email",
            Field::string().email().max_len(100).trim().lowercase().required(),
        )
        .field("password", Field::string().min_len(1).max_len(128).required())
}

pub fn update_role() -> Schema {
    Schema::object()
        .field("userId", Field::string().uuid_v4().required())
        .field("role", Field::string().one_of(ROLES).required())
}

pub fn startup_profile() -> Schema {
    Schema::object()
        .field(
            "companyName",
            Field::string().min_len(2).max_len(100).trim().required(),
        )
        .field("industry", Field::string().max_len(50).trim().required())
        .field(
            "fundingStage",
            Field::string().one_of(FUNDING_STAGES).required(),
        )
        .field(
            "employeeCount",
            Field::string().one_of(EMPLOYEE_COUNTS).required(),
        )
        .field("location", Field::string().max_len(100).trim().required())
        .field("pitch", Field::string().max_len(1000).trim().required())
        .field("website", Field::string().uri().max_len(200))
        .field(
            "foundedYear",
            Field::number()
                .integer()
                .min(1900.0)
                .max(current_year() as f64),
        )
}

pub fn investor_profile() -> Schema {
    Schema::object()
        .field(
            "companyName",
            Field::string().min_len(2).max_len(100).trim().required(),
        )
        .field(
            "industriesOfInterest",
            Field::array()
                .items(Field::string().max_len(50))
                .min_items(1)
                .max_items(10)
                .required(),
        )
        .field(
            "preferredStages",
            Field::array()
                .items(Field::string().one_of(FUNDING_STAGES))
                .min_items(1)
                .max_items(7)
                .required(),
        )
        .field("ticketSize", Field::string().one_of(TICKET_SIZES).required())
        .field(
            "investmentCriteria",
            Field::array()
                .items(Field::string().max_len(100))
                .min_items(1)
                .max_items(10)
                .required(),
        )
        .field(
            "pastInvestments",
            Field::string().max_len(2000).trim().allow_empty(),
        )
}

/// Optional profile sections shared by both roles.
pub fn extended_profile() -> Schema {
    let social_link = Schema::object()
        .field("platform", Field::string().one_of(SOCIAL_PLATFORMS).required())
        .field("url", Field::string().uri().max_len(200).required());
    let team_member = Schema::object()
        .field(
            "name",
            Field::string()
                .min_len(2)
                .max_len(50)
                .pattern(FULL_NAME_RE.clone(), None)
                .trim()
                .required(),
        )
        .field("position", Field::string().max_len(50).trim().required())
        .field("linkedin", Field::string().uri().max_len(200));
    let investment = Schema::object()
        .field(
            "companyName",
            Field::string().min_len(2).max_len(100).trim().required(),
        )
        .field("amount", Field::string().max_len(50))
        .field("stage", Field::string().max_len(50))
        .field(
            "year",
            Field::number()
                .integer()
                .min(2000.0)
                .max(current_year() as f64),
        );

    Schema::object()
        .field("bio", Field::string().max_len(500).trim().allow_empty())
        .field(
            "socialLinks",
            Field::array().items(Field::object(social_link)).max_items(5),
        )
        .field(
            "teamMembers",
            Field::array().items(Field::object(team_member)).max_items(10),
        )
        .field(
            "investmentHistory",
            Field::array().items(Field::object(investment)).max_items(20),
        )
}

/// Document metadata plus the descriptor of the uploaded file.
pub fn document_upload() -> Schema {
    let file = Schema::object()
        .field("originalName", Field::string().min_len(1).required())
        .field("mimeType", Field::string().max_len(200).trim().lowercase())
        .field("size", Field::number().integer().min(0.0).required());

    Schema::object()
        .field("description", Field::string().max_len(500).trim().allow_empty())
        .field("documentType", Field::string().one_of(DOCUMENT_TYPES).required())
        .field("category", Field::string().one_of(DOCUMENT_CATEGORIES).required())
        .field("isPublic", Field::boolean().default_value(false))
        .field("timePeriod", Field::string().max_len(50).trim().allow_empty())
        .field("file", Field::object(file).required())
}

pub fn document_share() -> Schema {
    Schema::object()
        .field(
            "emailAddresses",
            Field::array()
                .items(Field::string().email())
                .min_items(1)
                .max_items(10)
                .required(),
        )
        .field("customUrl", Field::string().uri().max_len(200))
        .field(
            "shareMethod",
            Field::string().one_of(SHARE_METHODS).default_value("email"),
        )
}

pub fn task_create() -> Schema {
    Schema::object()
        .field("title", Field::string().min_len(3).max_len(200).trim().required())
        .field(
            "description",
            Field::string().max_len(1000).trim().allow_empty(),
        )
        .field("dueDate", Field::string().min_date_now())
        .field(
            "priority",
            Field::string().one_of(TASK_PRIORITIES).default_value("medium"),
        )
        .field(
            "category",
            Field::string().one_of(TASK_CATEGORIES).default_value("other"),
        )
}

/// Partial task update; every field optional, past due dates allowed.
pub fn task_update() -> Schema {
    Schema::object()
        .field("title", Field::string().min_len(3).max_len(200).trim())
        .field(
            "description",
            Field::string().max_len(1000).trim().allow_empty(),
        )
        .field("dueDate", Field::string().iso_date())
        .field("priority", Field::string().one_of(TASK_PRIORITIES))
        .field("completed", Field::boolean())
        .field("category", Field::string().one_of(TASK_CATEGORIES))
}

/// Query string of search endpoints.
pub fn search_query() -> Schema {
    Schema::object()
        .field("q", Field::string().min_len(1).max_len(100).trim().required())
        .field(
            "page",
            Field::number().integer().min(1.0).default_value(1),
        )
        .field(
            "limit",
            Field::number()
                .integer()
                .min(1.0)
                .max(100.0)
                .default_value(20),
        )
}

/// Path parameters naming a user.
pub fn user_params() -> Schema {
    Schema::object().field("id", Field::string().uuid().required())
}

/// Path parameters naming a task.
pub fn task_params() -> Schema {
    Schema::object().field("id", Field::string().uuid_v4().required())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_current_year_tracks_clock() {
        assert_eq!(current_year(), i64::from(Utc::now().year()));
        assert!(current_year() >= 2024);
    }

    #[test]
    fn test_register_accepts_valid_payload() {
        let value = register()
            .validate(&json!({
                "email": "  Founder@Example.COM ",
                "password": "Str0ng!pass",
                "role": "startup",
                "fullName": "Ada Lovelace",
                "isAdmin": true
            }))
            .unwrap();
        assert_eq!(value["email"], "founder@example.com");
        assert!(value.get("isAdmin").is_none());
    }

    #[test]
    fn test_register_reports_two_violations_together() {
        let errors = register()
            .validate(&json!({
                "email": "founder@example.com",
                "password": "weakpass",
                "role": "admin",
                "fullName": "Ada Lovelace"
            }))
            .unwrap_err();
        assert_eq!(errors.fields(), ["password", "role"]);
    }

    #[test]
    fn test_register_rejects_disallowed_tld() {
        let errors = register()
            .validate(&json!({
                "email": "founder@example.xyz",
                "password": "Str0ng!pass",
                "role": "investor",
                "fullName": "Ada"
            }))
            .unwrap_err();
        assert_eq!(errors.fields(), ["email"]);
    }

    #[test]
    fn test_startup_profile_year_bounds() {
        let base = json!({
            "companyName": "Acme",
            "industry": "fintech",
            "fundingStage": "seed",
            "employeeCount": "1-10",
            "location": "Berlin",
            "pitch": "We build things.",
        });
        assert!(startup_profile().validate(&base).is_ok());

        let mut future = base.clone();
        future["foundedYear"] = json!(current_year() + 1);
        assert_eq!(startup_profile().validate(&future).unwrap_err().fields(), ["foundedYear"]);
    }

    #[test]
    fn test_search_query_converts_and_defaults() {
        let value = search_query()
            .validate(&json!({ "q": " rust ", "page": "3" }))
            .unwrap();
        assert_eq!(value, json!({ "q": "rust", "page": 3, "limit": 20 }));
    }

    #[test]
    fn test_task_defaults_and_iso_date() {
        let value = task_create()
            .validate(&json!({ "title": "Review deck", "dueDate": "2099-01-15" }))
            .unwrap();
        assert_eq!(value["priority"], "medium");
        assert_eq!(value["category"], "other");

        let errors = task_create()
            .validate(&json!({ "title": "Review deck", "dueDate": "next week" }))
            .unwrap_err();
        assert_eq!(errors.fields(), ["dueDate"]);
    }

    #[test]
    fn test_task_due_date_cannot_be_in_the_past() {
        let errors = task_create()
            .validate(&json!({ "title": "Review deck", "dueDate": "2001-01-01" }))
            .unwrap_err();
        assert_eq!(errors.fields(), ["dueDate"]);
        assert_eq!(
            errors.iter().next().unwrap().message,
            "\"dueDate\" must be greater than or equal to \"now\""
        );
    }

    #[test]
    fn test_user_params() {
        assert!(user_params()
            .validate(&json!({ "id": "9b2f6c1e-4d3a-4f5b-8c7d-1a2b3c4d5e6f" }))
            .is_ok());
        assert!(user_params().validate(&json!({ "id": "42" })).is_err());
    }

    #[test]
    fn test_investor_profile_checks_array_items() {
        let valid = json!({
            "companyName": "North Capital",
            "industriesOfInterest": ["fintech"],
            "preferredStages": ["seed", "series-a"],
            "ticketSize": "100k-500k",
            "investmentCriteria": ["strong team"],
        });
        assert!(investor_profile().validate(&valid).is_ok());

        let mut invalid = valid.clone();
        invalid["preferredStages"] = json!(["seed", "late"]);
        invalid["industriesOfInterest"] = json!([]);
        let errors = investor_profile().validate(&invalid).unwrap_err();
        assert_eq!(errors.fields(), ["industriesOfInterest", "preferredStages.1"]);
    }

    #[test]
    fn test_extended_profile_nested_paths() {
        let errors = extended_profile()
            .validate(&json!({
                "socialLinks": [{ "platform": "myspace", "url": "https://example.com" }],
                "teamMembers": [{ "name": "R2 D2", "position": "CTO" }],
                "investmentHistory": [{ "companyName": "Acme", "year": 1999 }],
            }))
            .unwrap_err();
        assert_eq!(
            errors.fields(),
            [
                "socialLinks.0.platform",
                "teamMembers.0.name",
                "investmentHistory.0.year",
            ]
        );
    }

    #[test]
    fn test_document_upload_requires_file_descriptor() {
        let value = document_upload()
            .validate(&json!({
                "documentType": "financial",
                "category": "financial",
                "file": { "originalName": "q3.pdf", "mimeType": "Application/PDF", "size": 2048 },
            }))
            .unwrap();
        assert_eq!(value["isPublic"], false);
        assert_eq!(value["file"]["mimeType"], "application/pdf");

        let errors = document_upload()
            .validate(&json!({ "documentType": "memo", "category": "legal" }))
            .unwrap_err();
        assert_eq!(errors.fields(), ["documentType", "file"]);
    }

    #[test]
    fn test_document_share_defaults_method() {
        let value = document_share()
            .validate(&json!({ "emailAddresses": ["a@example.com"] }))
            .unwrap();
        assert_eq!(value["shareMethod"], "email");

        let errors = document_share()
            .validate(&json!({ "emailAddresses": [], "shareMethod": "fax" }))
            .unwrap_err();
        assert_eq!(errors.fields(), ["emailAddresses", "shareMethod"]);
    }

    #[test]
    fn test_task_update_is_partial() {
        let value = task_update()
            .validate(&json!({ "completed": "true", "dueDate": "2001-01-01" }))
            .unwrap();
        assert_eq!(value, json!({ "completed": true, "dueDate": "2001-01-01" }));
        assert!(task_update().validate(&json!({ "title": "ab" })).is_err());
    }
}
