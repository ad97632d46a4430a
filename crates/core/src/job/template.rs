//! Named request templates for enqueuing jobs.
//!
//! A template holds the JSON request body of one job type. The
//! `__StartDate__` and `__EndDate__` placeholders are replaced with the
//! job's as-of date when a job is created from it.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{CreateJobRequest, DetailError, SubmitParams};

pub const START_DATE_PLACEHOLDER: &str = "__StartDate__";
pub const END_DATE_PLACEHOLDER: &str = "__EndDate__";

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("Unknown job type {name:?} (configured: {known})")]
    UnknownJobType { name: String, known: String },

    #[error("Template {name:?} does not produce valid parameters: {source}")]
    InvalidParams {
        name: String,
        #[source]
        source: DetailError,
    },
}

/// Request body of one job type, as configured under `[templates.<name>]`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct JobTemplate {
    /// JSON request body, possibly containing date placeholders
    pub params: String,
}

impl JobTemplate {
    /// Fill the date placeholders with `as_of`.
    pub fn render(&self, as_of: NaiveDate) -> String {
        let date = as_of.format(DATE_FORMAT).to_string();
        self.params
            .replace(START_DATE_PLACEHOLDER, &date)
            .replace(END_DATE_PLACEHOLDER, &date)
    }

    /// Check that the body is valid request parameters. Placeholders must
    /// sit inside JSON strings.
    pub fn validate(&self, name: &str) -> Result<(), TemplateError> {
        SubmitParams::parse(&self.params)
            .map(|_| ())
            .map_err(|source| TemplateError::InvalidParams {
                name: name.to_string(),
                source,
            })
    }
}

/// Build the enqueue request for job type `name` from its template.
pub fn request_from_template(
    templates: &BTreeMap<String, JobTemplate>,
    name: &str,
    as_of: NaiveDate,
) -> Result<CreateJobRequest, TemplateError> {
    let template = templates
        .get(name)
        .ok_or_else(|| TemplateError::UnknownJobType {
            name: name.to_string(),
            known: if templates.is_empty() {
                "none".to_string()
            } else {
                templates.keys().cloned().collect::<Vec<_>>().join(", ")
            },
        })?;

    template.validate(name)?;

    Ok(CreateJobRequest {
        name: name.to_string(),
        as_of,
        params: template.render(as_of),
    })
}
