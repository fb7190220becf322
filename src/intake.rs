//! Conversational collection of the identity fields a resume did not yield.
//!
//! Fields are asked for one at a time in the order name, email, phone. Every
//! prompt and accepted reply lands in the candidate's transcript.

use crate::error::SessionError;
use crate::resume::validate_field;
use crate::session::{IdentityField, IdentityFields, InterviewService, Role, Status};

pub const COMPLETE_MESSAGE: &str =
    "Thanks! All details received. Press Enter to start the interview.";

/// Where the conversation stands after a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeStep {
    /// The assistant asked for this field.
    Ask(IdentityField),
    /// Blank reply; nothing recorded.
    Ignored,
    /// Every field is known.
    Complete,
}

pub fn next_missing_field(identity: &IdentityFields) -> Option<IdentityField> {
    identity.missing().into_iter().next()
}

pub fn prompt_for(field: IdentityField) -> &'static str {
    match field {
        IdentityField::Name => "Please provide your full name.",
        IdentityField::Email => "Please provide your email address.",
        IdentityField::Phone => "Please provide your phone number.",
    }
}

/// Asks for the first missing field, if any.
pub async fn begin_conversation(
    service: &InterviewService,
    id: &str,
) -> Result<IntakeStep, SessionError> {
    let identity = collecting_identity(service, id).await?;
    match next_missing_field(&identity) {
        Some(field) => {
            service
                .append_message(id, Role::Assistant, prompt_for(field))
                .await?;
            Ok(IntakeStep::Ask(field))
        }
        None => Ok(IntakeStep::Complete),
    }
}

/// Treats `reply` as the value of the first missing field.
///
/// An invalid value is rejected with [`SessionError::InvalidField`] and
/// nothing is recorded.
pub async fn accept_field(
    service: &InterviewService,
    id: &str,
    reply: &str,
) -> Result<IntakeStep, SessionError> {
    let reply = reply.trim();
    if reply.is_empty() {
        return Ok(IntakeStep::Ignored);
    }
    let identity = collecting_identity(service, id).await?;
    let Some(field) = next_missing_field(&identity) else {
        return Ok(IntakeStep::Complete);
    };
    let value = validate_field(field, reply)?;

    service.append_message(id, Role::User, reply).await?;
    service
        .upsert_identity_fields(id, IdentityFields::default().with(field, value.clone()))
        .await?;

    let mut updated = identity;
    updated.set(field, value);
    match next_missing_field(&updated) {
        Some(next) => {
            service
                .append_message(id, Role::Assistant, prompt_for(next))
                .await?;
            Ok(IntakeStep::Ask(next))
        }
        None => {
            service
                .append_message(id, Role::Assistant, COMPLETE_MESSAGE)
                .await?;
            Ok(IntakeStep::Complete)
        }
    }
}

async fn collecting_identity(
    service: &InterviewService,
    id: &str,
) -> Result<IdentityFields, SessionError> {
    let candidate = service
        .candidate(id)
        .await
        .ok_or_else(|| SessionError::CandidateNotFound(id.to_string()))?;
    if candidate.status != Status::CollectingInfo {
        return Err(SessionError::InvalidTransition {
            action: "collect identity details",
            status: candidate.status,
        });
    }
    Ok(candidate.identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::session::SessionStore;

    fn service() -> InterviewService {
        InterviewService::new(SessionStore::in_memory())
    }

    #[tokio::test]
    async fn asks_for_fields_in_order() {
        let service = service();
        let id = service.create(IdentityFields::default()).await;

        assert_eq!(
            begin_conversation(&service, &id).await.unwrap(),
            IntakeStep::Ask(IdentityField::Name)
        );
        assert_eq!(
            accept_field(&service, &id, "  Ada Lovelace ").await.unwrap(),
            IntakeStep::Ask(IdentityField::Email)
        );
        assert_eq!(
            accept_field(&service, &id, "ada@analytical.engine").await.unwrap(),
            IntakeStep::Ask(IdentityField::Phone)
        );
        assert_eq!(
            accept_field(&service, &id, "+44 2071234567").await.unwrap(),
            IntakeStep::Complete
        );

        let c = service.candidate(&id).await.unwrap();
        assert!(c.identity.is_complete());
        assert_eq!(c.identity.name.as_deref(), Some("Ada Lovelace"));
        let contents: Vec<_> = c.transcript.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            vec![
                "Please provide your full name.",
                "Ada Lovelace",
                "Please provide your email address.",
                "ada@analytical.engine",
                "Please provide your phone number.",
                "+44 2071234567",
                COMPLETE_MESSAGE,
            ]
        );
    }

    #[tokio::test]
    async fn invalid_reply_changes_nothing() {
        let service = service();
        let id = service
            .create(IdentityFields::default().with(IdentityField::Name, "Ada"))
            .await;
        let before = service.candidate(&id).await.unwrap();

        let err = accept_field(&service, &id, "not an email").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(service.candidate(&id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn blank_reply_is_ignored() {
        let service = service();
        let id = service.create(IdentityFields::default()).await;
        assert_eq!(
            accept_field(&service, &id, "   ").await.unwrap(),
            IntakeStep::Ignored
        );
        assert!(service.candidate(&id).await.unwrap().transcript.is_empty());
    }

    #[tokio::test]
    async fn complete_identity_needs_no_prompt() {
        let service = service();
        let identity = IdentityFields::default()
            .with(IdentityField::Name, "Ada")
            .with(IdentityField::Email, "ada@example.com")
            .with(IdentityField::Phone, "5551234567");
        let id = service.create(identity).await;
        assert_eq!(
            begin_conversation(&service, &id).await.unwrap(),
            IntakeStep::Complete
        );
        assert!(service.candidate(&id).await.unwrap().transcript.is_empty());
    }

    #[tokio::test]
    async fn rejected_once_interview_started() {
        let service = service();
        let identity = IdentityFields::default()
            .with(IdentityField::Name, "Ada")
            .with(IdentityField::Email, "ada@example.com")
            .with(IdentityField::Phone, "5551234567");
        let id = service.create(identity).await;
        service.start(&id).await.unwrap();

        let err = accept_field(&service, &id, "Someone Else").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Rejected);
    }
}
