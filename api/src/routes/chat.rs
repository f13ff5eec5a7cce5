use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cadence_core::clarification::{
    ClarificationRequest, ResolvedDates, clarification_for, first_unresolved,
};
use cadence_core::dates::{DateRange, DateResolver, PhraseResolution, resolve_phrase};
use cadence_core::error::ApiError;
use cadence_core::intent::{DraftedIntent, parse_intent};
use cadence_core::intervention::{
    INTERVENTION_TTL_MINUTES, InterventionAlternative, InterventionProposal, InterventionReason,
    InterventionState, classify_reply, evaluate, translate_choice,
};
use cadence_core::phrases::extract_date_phrases;
use cadence_core::plan::{Modification, Plan};
use cadence_core::preview::{PreviewSet, build_preview, resolve_modifications};
use cadence_core::validation::{ValidationIssue, validate};

use crate::drafter::DraftContext;
use crate::error::AppError;
use crate::state::AppState;
use crate::store;

const MAX_MESSAGE_CHARS: usize = 4_000;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/plans/{plan_id}/chat/draft", post(chat_draft))
        .route(
            "/v1/plans/{plan_id}/chat/clarification",
            post(chat_clarification),
        )
        .route(
            "/v1/plans/{plan_id}/chat/intervention",
            post(chat_intervention),
        )
}

#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct DraftRequest {
    /// The user's chat message, verbatim.
    pub message: String,
    /// Dates pinned down earlier in this exchange, keyed by normalized
    /// phrase. Carrying this map forward is what keeps clarification
    /// idempotent across turns.
    #[serde(default)]
    #[schema(value_type = BTreeMap<String, NaiveDate>)]
    pub resolved_dates: ResolvedDates,
    /// Resubmit with true to accept confirmation-required warnings.
    #[serde(default)]
    pub confirm: bool,
    /// Recent conversation turns, oldest first, for drafter context.
    #[serde(default)]
    pub history: Vec<String>,
}

/// Outcome of one chat turn. Exactly one of these comes back per request;
/// only `preview` moves the pipeline forward toward a commit.
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DraftResponse {
    /// An ambiguous date (or a drafter question) needs answering first.
    ClarificationRequired {
        question: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        clarification: Option<ClarificationRequest>,
    },
    /// A destructive cancel set is gated; answer via the intervention
    /// endpoint.
    InterventionRequired {
        proposal_id: Uuid,
        reason: InterventionReason,
        questions: Vec<String>,
        alternatives: Vec<InterventionAlternative>,
    },
    /// Soft warnings only; resubmit the identical request with
    /// `confirm: true` to proceed.
    ConfirmationRequired { warnings: Vec<ValidationIssue> },
    /// A committable change-set, hashed and time-boxed.
    Preview { preview: PreviewSet },
    /// Nothing to change; the message was a question or commentary.
    Info {
        #[serde(skip_serializing_if = "Option::is_none")]
        reasoning: Option<String>,
    },
}

fn validate_message(message: &str) -> Result<(), AppError> {
    if message.trim().is_empty() {
        return Err(AppError::Validation {
            message: "message must not be empty".to_string(),
            field: Some("message".to_string()),
            received: None,
            docs_hint: None,
        });
    }
    if message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(AppError::Validation {
            message: format!("message exceeds {MAX_MESSAGE_CHARS} characters"),
            field: Some("message".to_string()),
            received: Some(serde_json::Value::Number(message.chars().count().into())),
            docs_hint: Some("Split the request into smaller messages.".to_string()),
        });
    }
    Ok(())
}

/// Draft a change from a chat message
///
/// Runs the full pipeline for one turn: date-phrase extraction (halting on
/// unresolved ambiguity), intent drafting, safety validation, the coaching
/// intervention gate, and preview construction. Stateless between turns:
/// everything that bridges to the next turn comes back in the response and
/// is persisted TTL-bound.
#[utoipa::path(
    post,
    path = "/v1/plans/{plan_id}/chat/draft",
    params(("plan_id" = Uuid, Path, description = "Plan ID")),
    request_body = DraftRequest,
    responses(
        (status = 200, description = "Turn outcome", body = DraftResponse),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 404, description = "Plan not found", body = ApiError),
        (status = 502, description = "Drafter failed", body = ApiError),
        (status = 504, description = "Drafter timed out", body = ApiError)
    ),
    tag = "chat"
)]
pub async fn chat_draft(
    State(state): State<AppState>,
    Path(plan_id): Path<Uuid>,
    Json(request): Json<DraftRequest>,
) -> Result<Json<DraftResponse>, AppError> {
    validate_message(&request.message)?;
    let response = run_draft_turn(&state, plan_id, &request).await?;
    Ok(Json(response))
}

async fn load_plan_and_today(
    state: &AppState,
    plan_id: Uuid,
) -> Result<(Plan, NaiveDate), AppError> {
    let plan = store::load_plan(&state.db, plan_id)
        .await?
        .ok_or_else(|| AppError::NotFound {
            message: format!("no plan with id {plan_id}"),
        })?;
    // The plan timezone is validated at plan creation; failing here means
    // the stored row is corrupt, not that the request is bad.
    let resolver = DateResolver::new(&plan.timezone)
        .map_err(|err| AppError::Internal(err.to_string()))?;
    let today = resolver.today();
    Ok((plan, today))
}

async fn run_draft_turn(
    state: &AppState,
    plan_id: Uuid,
    request: &DraftRequest,
) -> Result<DraftResponse, AppError> {
    let (plan, today) = load_plan_and_today(state, plan_id).await?;
    let now = Utc::now();

    let phrases = extract_date_phrases(&request.message);
    if let Some(ambiguous) = first_unresolved(&phrases, &request.resolved_dates) {
        if let Some(clarification) = clarification_for(plan_id, ambiguous, today, now) {
            store::store_clarification(&state.db, &clarification).await?;
            tracing::debug!(plan_id = %plan_id, phrase = %clarification.normalized_phrase, "halting for clarification");
            return Ok(DraftResponse::ClarificationRequired {
                question: clarification.question.clone(),
                clarification: Some(clarification),
            });
        }
    }

    // Hand the drafter every date the engine can already pin down; the
    // drafter never does date arithmetic of its own.
    let mut resolved_dates = request.resolved_dates.clone();
    let mut resolved_ranges: BTreeMap<String, DateRange> = BTreeMap::new();
    for phrase in &phrases {
        if phrase.ambiguous || resolved_dates.contains_key(&phrase.normalized) {
            continue;
        }
        match resolve_phrase(&phrase.normalized, today) {
            Ok(PhraseResolution::Date(date)) => {
                resolved_dates.insert(phrase.normalized.clone(), date);
            }
            Ok(PhraseResolution::Range(range)) => {
                resolved_ranges.insert(phrase.normalized.clone(), range);
            }
            _ => {}
        }
    }

    let reply = state
        .drafter
        .draft(&DraftContext {
            message: &request.message,
            today,
            resolved_dates: &resolved_dates,
            resolved_ranges: &resolved_ranges,
            plan: &plan,
            history: &request.history,
        })
        .await?;

    if reply.requires_clarification {
        let question = reply
            .clarification_question
            .unwrap_or_else(|| "Can you give me a bit more detail?".to_string());
        return Ok(DraftResponse::ClarificationRequired {
            question,
            clarification: None,
        });
    }

    let intent =
        parse_intent(&reply.intent).map_err(|err| AppError::DrafterInvalidResponse {
            message: err.to_string(),
        })?;
    if matches!(intent, DraftedIntent::Info) {
        return Ok(DraftResponse::Info {
            reasoning: reply.reasoning,
        });
    }

    let modifications =
        resolve_modifications(&intent, &plan).map_err(|err| AppError::Validation {
            message: err.to_string(),
            field: Some("intent".to_string()),
            received: Some(reply.intent.clone()),
            docs_hint: None,
        })?;

    finish_draft(
        state,
        &plan,
        Uuid::now_v7(),
        modifications,
        request.confirm,
        today,
        true,
    )
    .await
}

/// Validation, the intervention gate, and preview construction — shared by
/// the draft turn and the intervention-resolution turn (which skips the
/// gate: a resolved gate is never re-evaluated).
async fn finish_draft(
    state: &AppState,
    plan: &Plan,
    proposal_id: Uuid,
    modifications: Vec<Modification>,
    confirm: bool,
    today: NaiveDate,
    evaluate_gate: bool,
) -> Result<DraftResponse, AppError> {
    let now = Utc::now();
    let outcome = validate(&modifications, plan, today);
    if !outcome.valid {
        return Err(AppError::Validation {
            message: "the requested change violates plan safety rules".to_string(),
            field: Some("modifications".to_string()),
            received: serde_json::to_value(&outcome.errors).ok(),
            docs_hint: Some(
                "Each listed violation carries a stable code; adjust the request and re-draft."
                    .to_string(),
            ),
        });
    }
    if !outcome.warnings.is_empty() && !confirm {
        return Ok(DraftResponse::ConfirmationRequired {
            warnings: outcome.warnings,
        });
    }

    if evaluate_gate {
        if let InterventionState::Pending {
            reason,
            questions,
            alternatives,
        } = evaluate(&modifications, today)
        {
            let proposal = InterventionProposal {
                id: proposal_id,
                plan_id: plan.id,
                reason,
                questions: questions.clone(),
                alternatives: alternatives.clone(),
                modifications,
                created_at: now,
                expires_at: now + Duration::minutes(INTERVENTION_TTL_MINUTES),
            };
            store::store_proposal(&state.db, &proposal).await?;
            tracing::debug!(plan_id = %plan.id, reason = reason.as_str(), "halting for intervention");
            return Ok(DraftResponse::InterventionRequired {
                proposal_id,
                reason,
                questions,
                alternatives,
            });
        }
    }

    let warning_notes = outcome
        .warnings
        .iter()
        .map(|warning| warning.message.clone())
        .collect();
    let preview = build_preview(plan, proposal_id, modifications, warning_notes, today, now);
    store::store_preview(&state.db, &preview).await?;
    Ok(DraftResponse::Preview { preview })
}

#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct ClarificationResponseRequest {
    pub clarification_id: Uuid,
    /// The option the user picked; must be one of the offered dates.
    pub selected_date: NaiveDate,
    /// The original message, resent verbatim.
    pub message: String,
    #[serde(default)]
    #[schema(value_type = BTreeMap<String, NaiveDate>)]
    pub resolved_dates: ResolvedDates,
    #[serde(default)]
    pub confirm: bool,
    #[serde(default)]
    pub history: Vec<String>,
}

/// Answer a pending clarification
///
/// Merges the selected date into the exchange's resolved map (keyed by
/// normalized phrase) and re-enters the draft pipeline. The answered phrase
/// is never asked again in this exchange.
#[utoipa::path(
    post,
    path = "/v1/plans/{plan_id}/chat/clarification",
    params(("plan_id" = Uuid, Path, description = "Plan ID")),
    request_body = ClarificationResponseRequest,
    responses(
        (status = 200, description = "Turn outcome", body = DraftResponse),
        (status = 400, description = "Selected date is not an offered option", body = ApiError),
        (status = 404, description = "Clarification unknown or expired", body = ApiError)
    ),
    tag = "chat"
)]
pub async fn chat_clarification(
    State(state): State<AppState>,
    Path(plan_id): Path<Uuid>,
    Json(request): Json<ClarificationResponseRequest>,
) -> Result<Json<DraftResponse>, AppError> {
    validate_message(&request.message)?;

    let clarification = store::load_clarification(&state.db, plan_id, request.clarification_id)
        .await?
        .ok_or_else(|| AppError::NotFound {
            message: "clarification not found; resend the message to start over".to_string(),
        })?;

    if clarification.is_expired(Utc::now()) {
        store::delete_clarification(&state.db, clarification.id).await?;
        return Err(AppError::NotFound {
            message: "clarification expired; resend the message to start over".to_string(),
        });
    }

    if !clarification
        .options
        .iter()
        .any(|option| option.date == request.selected_date)
    {
        return Err(AppError::Validation {
            message: "selected_date is not one of the offered options".to_string(),
            field: Some("selected_date".to_string()),
            received: serde_json::to_value(request.selected_date).ok(),
            docs_hint: Some("Pick one of the dates from the clarification options.".to_string()),
        });
    }

    let mut resolved_dates = request.resolved_dates.clone();
    resolved_dates.insert(
        clarification.normalized_phrase.clone(),
        request.selected_date,
    );
    store::delete_clarification(&state.db, clarification.id).await?;

    let draft = DraftRequest {
        message: request.message,
        resolved_dates,
        confirm: request.confirm,
        history: request.history,
    };
    let response = run_draft_turn(&state, plan_id, &draft).await?;
    Ok(Json(response))
}

#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct InterventionReplyRequest {
    pub proposal_id: Uuid,
    /// Free-text reply to the intervention questions.
    pub reply: String,
    #[serde(default)]
    pub confirm: bool,
}

/// Answer a pending intervention
///
/// Classifies the reply against the offered alternatives. An unclassifiable
/// reply leaves the gate pending and re-asks; choosing an alternative
/// rewrites the cancel set into that alternative's operations; choosing to
/// proceed carries the original cancels through unchanged. Either way the
/// result re-enters validation before a preview is built.
#[utoipa::path(
    post,
    path = "/v1/plans/{plan_id}/chat/intervention",
    params(("plan_id" = Uuid, Path, description = "Plan ID")),
    request_body = InterventionReplyRequest,
    responses(
        (status = 200, description = "Turn outcome", body = DraftResponse),
        (status = 404, description = "Proposal unknown or expired", body = ApiError)
    ),
    tag = "chat"
)]
pub async fn chat_intervention(
    State(state): State<AppState>,
    Path(plan_id): Path<Uuid>,
    Json(request): Json<InterventionReplyRequest>,
) -> Result<Json<DraftResponse>, AppError> {
    let proposal = store::load_proposal(&state.db, plan_id, request.proposal_id)
        .await?
        .ok_or_else(|| AppError::NotFound {
            message: "intervention proposal not found; draft the change again".to_string(),
        })?;

    if proposal.expires_at <= Utc::now() {
        store::delete_proposal(&state.db, proposal.id).await?;
        return Err(AppError::NotFound {
            message: "intervention proposal expired; draft the change again".to_string(),
        });
    }

    let Some(choice) = classify_reply(&request.reply, &proposal.alternatives).into_key() else {
        // No confident read on the reply: the gate stays pending and the
        // same questions go back out. Guessing is not an option here.
        return Ok(Json(DraftResponse::InterventionRequired {
            proposal_id: proposal.id,
            reason: proposal.reason,
            questions: proposal.questions,
            alternatives: proposal.alternatives,
        }));
    };

    let (plan, today) = load_plan_and_today(&state, plan_id).await?;
    let translated = translate_choice(choice, proposal.reason, &proposal.modifications, &plan);
    store::delete_proposal(&state.db, proposal.id).await?;

    let response = finish_draft(
        &state,
        &plan,
        proposal.id,
        translated,
        request.confirm,
        today,
        false,
    )
    .await?;
    Ok(Json(response))
}
