//! Form intake pipeline.
//!
//! One call to [`Pipeline::submit`] handles one posted form:
//!
//! 1. the posted anti-forgery token is compared with the session's token;
//! 2. the form kind is resolved (`customer` or `plan`);
//! 3. every field is trimmed and HTML-escaped ([`sanitize`]);
//! 4. the shared ruleset ([`validate`]) collects one error per bad field;
//! 5. only an empty error set leads to a single parameterized insert.
//!
//! Nothing escapes as an `Err`: every path ends in a [`Submission`] the
//! caller renders.
use crate::catalog::Catalog;
use crate::models::{LeadStore, NewLead, NewPlanOrder};
use crate::settings::Settings;
use chrono::{FixedOffset, Utc};
use log::{error, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Field name to message; form-level problems use the `form` key.
pub type FieldErrors = BTreeMap<String, String>;

pub const FORM_ERROR_KEY: &str = "form";

const CSRF_MESSAGE: &str = "Invalid CSRF token.";
const INVALID_SUBMISSION_MESSAGE: &str = "Invalid form submission.";
const PLAN_REQUIRED_MESSAGE: &str = "Please select a price plan.";
const PLAN_UNKNOWN_MESSAGE: &str = "Please select a valid price plan.";

/// Required fields shared by both forms, with their messages.
const REQUIRED: [(&str, &str); 9] = [
    ("name", "Name is required."),
    ("company_name", "Company Name is required."),
    ("email", "A valid Email is required."),
    ("phone", "Phone is required."),
    ("address", "Address is required."),
    ("area", "Area is required."),
    ("city", "City is required."),
    ("post_code", "Post Code is required."),
    ("country", "Country is required."),
];

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+)*@(?:[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.)+[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?$",
    )
    .expect("email pattern compiles")
});

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FormKind {
    Customer,
    Plan,
}

impl FormKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "customer" => Some(FormKind::Customer),
            "plan" => Some(FormKind::Plan),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FormKind::Customer => "customer",
            FormKind::Plan => "plan",
        }
    }

    fn save_failed_message(&self) -> &'static str {
        match self {
            FormKind::Customer => "Failed to save contact data. Please try again.",
            FormKind::Plan => "Failed to save subscription data. Please try again.",
        }
    }
}

/// Trim, then escape `& < > " '` for safe display inside HTML.
pub fn sanitize(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut out = String::with_capacity(trimmed.len());
    for c in trimmed.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn is_valid_email(email: &str) -> bool {
    if email.len() > 254 {
        return false;
    }
    match email.rsplit_once('@') {
        Some((local, _)) if local.len() <= 64 => EMAIL.is_match(email),
        _ => false,
    }
}

/// Sanitized form values, ready to re-render or persist.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FormFields {
    pub software: String,
    pub source: String,
    pub name: String,
    pub company_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub area: String,
    pub city: String,
    pub post_code: String,
    pub country: String,
    pub note: String,
    pub plan: String,
}

impl FormFields {
    /// Sanitizes every known field of `raw`. The plan arrives as `price_plan`.
    pub fn from_raw(raw: &HashMap<String, String>) -> Self {
        let get = |key: &str| raw.get(key).map(|v| sanitize(v)).unwrap_or_default();
        FormFields {
            software: get("software"),
            source: get("source"),
            name: get("name"),
            company_name: get("company_name"),
            email: get("email"),
            phone: get("phone"),
            address: get("address"),
            area: get("area"),
            city: get("city"),
            post_code: get("post_code"),
            country: get("country"),
            note: get("note"),
            plan: get("price_plan"),
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        let value = match field {
            "software" => &self.software,
            "source" => &self.source,
            "name" => &self.name,
            "company_name" => &self.company_name,
            "email" => &self.email,
            "phone" => &self.phone,
            "address" => &self.address,
            "area" => &self.area,
            "city" => &self.city,
            "post_code" => &self.post_code,
            "country" => &self.country,
            "note" => &self.note,
            "plan" => &self.plan,
            _ => return None,
        };
        Some(value.as_str())
    }
}

/// The ruleset both forms share. Every field is checked; nothing short-circuits.
pub fn validate(kind: FormKind, fields: &FormFields) -> FieldErrors {
    let mut errors = FieldErrors::new();
    for (field, message) in REQUIRED {
        let value = fields.get(field).unwrap_or_default();
        let bad = value.is_empty() || (field == "email" && !is_valid_email(value));
        if bad {
            errors.insert(field.to_string(), message.to_string());
        }
    }
    if kind == FormKind::Plan && fields.plan.is_empty() {
        errors.insert("plan".to_string(), PLAN_REQUIRED_MESSAGE.to_string());
    }
    errors
}

/// How a submission ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Submission {
    /// One row was written; the form should be shown empty again.
    Accepted { kind: FormKind, id: i64 },
    ValidationFailed {
        kind: FormKind,
        errors: FieldErrors,
        fields: FormFields,
    },
    CsrfMismatch,
    InvalidSubmission { fields: FormFields },
    PersistenceFailed { kind: FormKind, fields: FormFields },
}

impl Submission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Submission::Accepted { .. })
    }

    pub fn status(&self) -> &'static str {
        match self {
            Submission::Accepted { .. } => "accepted",
            Submission::ValidationFailed { .. } => "validation_failed",
            Submission::CsrfMismatch => "csrf_mismatch",
            Submission::InvalidSubmission { .. } => "invalid_submission",
            Submission::PersistenceFailed { .. } => "persistence_failed",
        }
    }

    /// Keyed messages for the page: per field, or under `form` for the whole form.
    pub fn errors(&self) -> FieldErrors {
        let form_error = |message: &str| {
            FieldErrors::from([(FORM_ERROR_KEY.to_string(), message.to_string())])
        };
        match self {
            Submission::Accepted { .. } => FieldErrors::new(),
            Submission::ValidationFailed { errors, .. } => errors.clone(),
            Submission::CsrfMismatch => form_error(CSRF_MESSAGE),
            Submission::InvalidSubmission { .. } => form_error(INVALID_SUBMISSION_MESSAGE),
            Submission::PersistenceFailed { kind, .. } => form_error(kind.save_failed_message()),
        }
    }

    /// Values to pre-fill the re-rendered form with.
    pub fn fields(&self) -> FormFields {
        match self {
            Submission::Accepted { .. } | Submission::CsrfMismatch => FormFields::default(),
            Submission::ValidationFailed { fields, .. }
            | Submission::InvalidSubmission { fields }
            | Submission::PersistenceFailed { fields, .. } => fields.clone(),
        }
    }
}

/// Deployment knobs the pipeline needs, lifted from [`Settings`].
#[derive(Clone, Debug)]
pub struct IntakeOptions {
    pub software: String,
    pub source: String,
    pub offset: FixedOffset,
    pub strict_plan_names: bool,
}

impl From<&Settings> for IntakeOptions {
    fn from(settings: &Settings) -> Self {
        IntakeOptions {
            software: settings.software.clone(),
            source: settings.source.clone(),
            offset: settings.timezone.offset(),
            strict_plan_names: settings.strict_plan_names,
        }
    }
}

pub struct Pipeline {
    store: Arc<dyn LeadStore>,
    catalog: Arc<Catalog>,
    options: IntakeOptions,
}

impl Pipeline {
    pub fn new(store: Arc<dyn LeadStore>, catalog: Arc<Catalog>, options: IntakeOptions) -> Self {
        Pipeline {
            store,
            catalog,
            options,
        }
    }

    pub async fn submit(
        &self,
        form_kind: &str,
        raw_fields: &HashMap<String, String>,
        csrf_token: &str,
        session_token: &str,
    ) -> Submission {
        if !crate::session::tokens_match(session_token, csrf_token) {
            warn!("Rejected submission: anti-forgery token mismatch");
            return Submission::CsrfMismatch;
        }

        let mut fields = FormFields::from_raw(raw_fields);
        let Some(kind) = FormKind::parse(form_kind) else {
            warn!("Rejected submission: unknown form kind");
            return Submission::InvalidSubmission { fields };
        };
        if fields.software.is_empty() {
            fields.software = sanitize(&self.options.software);
        }
        if fields.source.is_empty() {
            fields.source = sanitize(&self.options.source);
        }

        let mut errors = validate(kind, &fields);
        if kind == FormKind::Plan
            && self.options.strict_plan_names
            && !fields.plan.is_empty()
            && !self.catalog.offers_plan(&fields.plan)
        {
            errors.insert("plan".to_string(), PLAN_UNKNOWN_MESSAGE.to_string());
        }
        if !errors.is_empty() {
            warn!(
                "Rejected {} submission: {} invalid field(s)",
                kind.as_str(),
                errors.len()
            );
            return Submission::ValidationFailed {
                kind,
                errors,
                fields,
            };
        }

        let now = self.now();
        let inserted = match kind {
            FormKind::Customer => self.store.insert_lead(&lead(&fields, &now)).await,
            FormKind::Plan => self.store.insert_plan_order(&plan_order(&fields, &now)).await,
        };
        match inserted {
            Ok(id) => {
                info!("Accepted {} submission as row {}", kind.as_str(), id);
                Submission::Accepted { kind, id }
            }
            Err(e) => {
                error!("Failed to persist {} submission: {}", kind.as_str(), e);
                Submission::PersistenceFailed { kind, fields }
            }
        }
    }

    fn now(&self) -> String {
        Utc::now()
            .with_timezone(&self.options.offset)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }
}

fn lead(f: &FormFields, now: &str) -> NewLead {
    NewLead {
        software: f.software.clone(),
        source: f.source.clone(),
        name: f.name.clone(),
        company_name: f.company_name.clone(),
        email: f.email.clone(),
        phone: f.phone.clone(),
        address: f.address.clone(),
        area: f.area.clone(),
        city: f.city.clone(),
        post_code: f.post_code.clone(),
        country: f.country.clone(),
        note: f.note.clone(),
        created_at: now.to_string(),
        updated_at: now.to_string(),
    }
}

fn plan_order(f: &FormFields, now: &str) -> NewPlanOrder {
    NewPlanOrder {
        software: f.software.clone(),
        source: f.source.clone(),
        name: f.name.clone(),
        company_name: f.company_name.clone(),
        email: f.email.clone(),
        phone: f.phone.clone(),
        address: f.address.clone(),
        area: f.area.clone(),
        city: f.city.clone(),
        post_code: f.post_code.clone(),
        country: f.country.clone(),
        plan: f.plan.clone(),
        created_at: now.to_string(),
        updated_at: now.to_string(),
    }
}
