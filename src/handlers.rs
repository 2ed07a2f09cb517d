//! The form endpoints.
//!
//! A page is served and posted back on the same path, like the landing pages
//! it backs: `GET` hands out the form state, `POST` runs the intake pipeline.
use crate::catalog::PricePlan;
use crate::intake::{FieldErrors, FormFields, Submission};
use crate::route;
use crate::router::{AppState, RequestContext, Response, Router};
use crate::session::SessionContext;
use serde::Serialize;
use std::collections::HashMap;

/// Paths that serve a lead form.
pub const FORM_PATHS: [&str; 2] = ["/", "/plan"];

#[derive(Serialize)]
struct FormPage<'a> {
    csrf_token: &'a str,
    software: &'a str,
    source: &'a str,
    countries: &'a [String],
    plans: &'a [PricePlan],
    setup_fee: u32,
    currency: &'a str,
    fields: FormFields,
    errors: FieldErrors,
}

#[derive(Serialize)]
struct SubmissionReply<'a> {
    status: &'a str,
    errors: FieldErrors,
    fields: FormFields,
    csrf_token: &'a str,
}

pub fn routes(router: &mut Router) {
    for path in FORM_PATHS {
        route!(router,
            GET path => { show_form },
            POST path => { submit_form },
        );
    }
}

fn session_for(ctx: &RequestContext, state: &AppState) -> SessionContext {
    let cookie = ctx.cookie(&state.settings.session.cookie_name);
    state.sessions.get_or_create(cookie)
}

fn session_cookie(state: &AppState, session: &SessionContext) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/",
        state.settings.session.cookie_name, session.id
    )
}

pub async fn show_form(ctx: RequestContext, state: AppState) -> Response {
    let session = session_for(&ctx, &state);
    let page = FormPage {
        csrf_token: &session.csrf_token,
        software: &state.settings.software,
        source: &state.settings.source,
        countries: &state.catalog.countries,
        plans: &state.catalog.plans,
        setup_fee: state.catalog.setup_fee,
        currency: state.catalog.currency,
        fields: FormFields::default(),
        errors: FieldErrors::new(),
    };
    Response::json(page, 200, HashMap::new()).header("Set-Cookie", session_cookie(&state, &session))
}

pub async fn submit_form(ctx: RequestContext, state: AppState) -> Response {
    let mut session = session_for(&ctx, &state);
    let form = ctx.form();
    let field = |key: &str| form.get(key).map(String::as_str).unwrap_or_default();

    let outcome = state
        .pipeline
        .submit(
            field("form_type"),
            &form,
            field("csrf_token"),
            &session.csrf_token,
        )
        .await;

    if state.settings.session.rotate_csrf {
        if let Some(token) = state.sessions.rotate(&session.id) {
            session.csrf_token = token;
        }
    }

    let reply = SubmissionReply {
        status: outcome.status(),
        errors: outcome.errors(),
        fields: outcome.fields(),
        csrf_token: &session.csrf_token,
    };
    Response::json(reply, status_code(&outcome), HashMap::new())
        .header("Set-Cookie", session_cookie(&state, &session))
}

pub fn status_code(outcome: &Submission) -> u16 {
    match outcome {
        Submission::Accepted { .. } => 200,
        Submission::ValidationFailed { .. } => 422,
        Submission::CsrfMismatch => 403,
        Submission::InvalidSubmission { .. } => 400,
        Submission::PersistenceFailed { .. } => 500,
    }
}
