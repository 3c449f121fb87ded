//! AdmissionReview handlers
//!
//! Decodes OpAMPBridge admission requests, runs them through the admission
//! pipelines and encodes the decision. Mutations are returned as a JSON patch
//! computed by diffing the object before and after defaulting.

use std::sync::Arc;

use axum::{extract::State, Json};
use kube::core::{
    admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation},
    DynamicObject,
};
use tracing::{debug, error, info, warn};

use crate::crd::OpAMPBridge;

use super::WebhookState;

/// Error type for webhook operations
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The request carried no object to admit
    #[error("invalid admission review: {0}")]
    InvalidReview(String),

    /// The object could not be converted to or from an OpAMPBridge
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The admission pipeline rejected the object
    #[error(transparent)]
    Rejected(#[from] crate::Error),
}

/// Handle mutating admission review for OpAMPBridges
pub async fn mutate_handler(
    State(state): State<Arc<WebhookState>>,
    Json(body): Json<AdmissionReview<DynamicObject>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let req: AdmissionRequest<DynamicObject> = match body.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "Failed to parse admission request");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };
    Json(mutate(&state, &req).into_review())
}

/// Handle validating admission review for OpAMPBridges
pub async fn validate_handler(
    State(state): State<Arc<WebhookState>>,
    Json(body): Json<AdmissionReview<DynamicObject>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let req: AdmissionRequest<DynamicObject> = match body.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "Failed to parse admission request");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };
    Json(validate(&state, &req).into_review())
}

fn to_bridge(obj: &DynamicObject) -> Result<OpAMPBridge, WebhookError> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

/// Default the requested bridge and answer with the resulting patch
pub fn mutate(state: &WebhookState, req: &AdmissionRequest<DynamicObject>) -> AdmissionResponse {
    let uid = req.uid.as_str();
    let Some(obj) = &req.object else {
        debug!(uid, "No object in request, allowing unchanged");
        return AdmissionResponse::from(req);
    };

    let patch = match default_patch(state, &req.operation, obj) {
        Ok(patch) => patch,
        Err(e) => {
            warn!(uid, error = %e, "Rejecting undecodable OpAMPBridge");
            return AdmissionResponse::from(req).deny(e.to_string());
        }
    };

    info!(uid, name = %req.name, patch_ops = patch.0.len(), "Defaulted OpAMPBridge");
    match AdmissionResponse::from(req).with_patch(patch) {
        Ok(response) => response,
        Err(e) => {
            error!(uid, error = %e, "Failed to serialize patch");
            AdmissionResponse::from(req).deny(format!("patch serialization error: {e}"))
        }
    }
}

fn default_patch(
    state: &WebhookState,
    op: &Operation,
    obj: &DynamicObject,
) -> Result<json_patch::Patch, WebhookError> {
    let bridge = to_bridge(obj)?;
    let before = serde_json::to_value(&bridge)?;
    let defaulted = state.mutating.admit(op, None, bridge)?;
    let after = serde_json::to_value(&defaulted)?;
    Ok(json_patch::diff(&before, &after))
}

/// Admit or reject the requested bridge
pub fn validate(state: &WebhookState, req: &AdmissionRequest<DynamicObject>) -> AdmissionResponse {
    let uid = req.uid.as_str();
    match admit(state, req) {
        Ok(()) => AdmissionResponse::from(req),
        Err(e) => {
            info!(uid, name = %req.name, reason = %e, "Rejected OpAMPBridge");
            AdmissionResponse::from(req).deny(e.to_string())
        }
    }
}

fn admit(
    state: &WebhookState,
    req: &AdmissionRequest<DynamicObject>,
) -> Result<(), WebhookError> {
    // deletes carry the stored object in oldObject only
    let (subject, old) = match req.operation {
        Operation::Delete => (req.old_object.as_ref(), None),
        _ => (req.object.as_ref(), req.old_object.as_ref()),
    };
    let subject = subject
        .ok_or_else(|| WebhookError::InvalidReview("request carries no object".to_string()))?;
    let new = to_bridge(subject)?;
    let old = old.map(to_bridge).transpose()?;
    state.validating.admit(&req.operation, old.as_ref(), new)?;
    Ok(())
}
