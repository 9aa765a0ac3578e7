use ambush_contracts::credentials::Credential;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;

use crate::failure::{truncate_text, CallFailure};

/// POST a JSON body with the bearer credential. Non-2xx is a failure.
pub(crate) fn post_json(
    http: &HttpClient,
    endpoint: &str,
    credential: &Credential,
    payload: &Value,
) -> Result<HttpResponse, CallFailure> {
    let response = http
        .post(endpoint)
        .bearer_auth(credential.expose())
        .header(CONTENT_TYPE, "application/json")
        .json(payload)
        .send()
        .map_err(|err| CallFailure::transport(&err))?;
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().unwrap_or_default();
        return Err(CallFailure::Status {
            status,
            body: truncate_text(body.trim(), 512),
        });
    }
    Ok(response)
}

/// `[ { "generated_text": ... } ]`, first element, verbatim.
pub(crate) fn read_generated_text(response: HttpResponse) -> Result<String, CallFailure> {
    let body = response
        .text()
        .map_err(|err| CallFailure::transport(&err))?;
    let parsed: Value = serde_json::from_str(&body)
        .map_err(|err| CallFailure::Shape(format!("invalid JSON payload: {err}")))?;
    first_generated_text(&parsed).ok_or_else(|| {
        CallFailure::Shape(format!(
            "missing [0].generated_text in {}",
            truncate_text(&body, 256)
        ))
    })
}

pub(crate) fn first_generated_text(payload: &Value) -> Option<String> {
    payload
        .as_array()?
        .first()?
        .get("generated_text")?
        .as_str()
        .map(str::to_string)
}
