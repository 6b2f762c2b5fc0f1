//! Raw swarm message to [`Interaction`] conversion.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use confab_shared::constants::{
    MSG_KEY_ACTION, MSG_KEY_BODY, MSG_KEY_CONF_ID, MSG_KEY_DISPLAY_NAME, MSG_KEY_DURATION,
    MSG_KEY_FILE_ID, MSG_KEY_INVITED, MSG_KEY_TOTAL_SIZE, MSG_KEY_URI, MSG_TYPE_CALL_HISTORY,
    MSG_TYPE_DATA_TRANSFER, MSG_TYPE_EDITED, MSG_TYPE_INITIAL, MSG_TYPE_MEMBER, MSG_TYPE_MERGE,
    MSG_TYPE_PROFILE, MSG_TYPE_TEXT,
};
use confab_shared::protocol::RawSwarmMessage;
use confab_shared::types::{ConferenceId, ConversationId, ConversationKind, Uri};

use crate::error::{ConvertError, Result};
use crate::interaction::{ContactAction, Interaction, InteractionBody};

type Converter = fn(&RawSwarmMessage, ConversationKind) -> Result<InteractionBody>;

const CONVERTERS: &[(&str, Converter)] = &[
    (MSG_TYPE_INITIAL, initial),
    (MSG_TYPE_MEMBER, member),
    (MSG_TYPE_TEXT, text),
    (MSG_TYPE_EDITED, text),
    (MSG_TYPE_DATA_TRANSFER, data_transfer),
    (MSG_TYPE_CALL_HISTORY, call_history),
    (MSG_TYPE_PROFILE, invalid),
    (MSG_TYPE_MERGE, invalid),
];

/// Convert one raw message. Returns `None` only when the message has no id
/// and so cannot be placed at all; every other defect yields an invalid
/// placeholder.
pub fn convert(
    conversation: &ConversationId,
    kind: ConversationKind,
    raw: &RawSwarmMessage,
) -> Option<Interaction> {
    let Some(id) = raw.id() else {
        warn!(conversation = %conversation, "Swarm message without id dropped");
        return None;
    };

    let body = match CONVERTERS.iter().find(|(t, _)| *t == raw.kind()) {
        Some((_, converter)) => converter(raw, kind).unwrap_or_else(|e| {
            warn!(conversation = %conversation, message = %id, error = %e, "Malformed swarm message");
            InteractionBody::Invalid
        }),
        None => {
            debug!(message = %id, kind = raw.kind(), "Unsupported swarm message type");
            InteractionBody::Invalid
        }
    };

    let timestamp: DateTime<Utc> = raw.timestamp().unwrap_or_default();
    let mut interaction = Interaction::new(id, conversation.clone(), raw.author(), timestamp, body);
    interaction.parent = raw.parent();
    interaction.reply_to = raw.reply_to();
    interaction.react_to = raw.react_to();
    interaction.edit_of = raw.edit();
    Some(interaction)
}

fn required<'a>(raw: &'a RawSwarmMessage, key: &'static str) -> Result<&'a str> {
    raw.non_empty(key).ok_or(ConvertError::MissingField(key))
}

fn number(raw: &RawSwarmMessage, key: &'static str) -> Result<Option<u64>> {
    raw.non_empty(key)
        .map(|v| {
            v.parse::<u64>().map_err(|_| ConvertError::BadNumber {
                field: key,
                value: v.to_string(),
            })
        })
        .transpose()
}

fn initial(raw: &RawSwarmMessage, kind: ConversationKind) -> Result<InteractionBody> {
    if !kind.is_one_to_one() {
        return Ok(InteractionBody::Invalid);
    }
    Ok(InteractionBody::Contact {
        member: Uri::parse(required(raw, MSG_KEY_INVITED)?),
        action: ContactAction::Invited,
    })
}

fn member(raw: &RawSwarmMessage, _: ConversationKind) -> Result<InteractionBody> {
    let action = required(raw, MSG_KEY_ACTION)?;
    Ok(InteractionBody::Contact {
        member: Uri::parse(required(raw, MSG_KEY_URI)?),
        action: ContactAction::from_action(action)
            .ok_or_else(|| ConvertError::UnknownAction(action.to_string()))?,
    })
}

fn text(raw: &RawSwarmMessage, _: ConversationKind) -> Result<InteractionBody> {
    Ok(InteractionBody::Text {
        body: raw.get(MSG_KEY_BODY).unwrap_or_default().to_string(),
    })
}

fn data_transfer(raw: &RawSwarmMessage, _: ConversationKind) -> Result<InteractionBody> {
    Ok(InteractionBody::DataTransfer {
        file_id: required(raw, MSG_KEY_FILE_ID)?.to_string(),
        display_name: required(raw, MSG_KEY_DISPLAY_NAME)?.to_string(),
        total_size: number(raw, MSG_KEY_TOTAL_SIZE)?.ok_or(ConvertError::MissingField(MSG_KEY_TOTAL_SIZE))?,
    })
}

fn call_history(raw: &RawSwarmMessage, _: ConversationKind) -> Result<InteractionBody> {
    Ok(InteractionBody::Call {
        duration_ms: number(raw, MSG_KEY_DURATION)?.unwrap_or(0),
        conf_id: raw.non_empty(MSG_KEY_CONF_ID).map(ConferenceId::from),
    })
}

fn invalid(_: &RawSwarmMessage, _: ConversationKind) -> Result<InteractionBody> {
    Ok(InteractionBody::Invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::InteractionKind;
    use confab_shared::types::MessageId;

    fn conv() -> ConversationId {
        ConversationId::from("conv")
    }

    fn raw(entries: &[(&str, &str)]) -> RawSwarmMessage {
        RawSwarmMessage::new(entries.iter().copied())
    }

    fn kind_of(entries: &[(&str, &str)], kind: ConversationKind) -> InteractionKind {
        convert(&conv(), kind, &raw(entries)).unwrap().kind()
    }

    #[test]
    fn test_text_with_links() {
        let i = convert(
            &conv(),
            ConversationKind::Public,
            &raw(&[
                ("id", "m2"),
                ("type", "text/plain"),
                ("author", "bob"),
                ("body", "hi"),
                ("linearizedParent", "m1"),
                ("timestamp", "1700000000"),
                ("reply-to", "m0"),
            ]),
        )
        .unwrap();
        assert_eq!(i.raw_text(), Some("hi"));
        assert_eq!(i.parent, Some(MessageId::from("m1")));
        assert_eq!(i.reply_to, Some(MessageId::from("m0")));
        assert_eq!(i.timestamp.timestamp(), 1_700_000_000);
        assert_eq!(i.author, "bob");
    }

    #[test]
    fn test_initial_depends_on_kind() {
        let entries = [("id", "m0"), ("type", "initial"), ("invited", "sip:bob")];
        assert_eq!(kind_of(&entries, ConversationKind::OneToOne), InteractionKind::Contact);
        assert_eq!(kind_of(&entries, ConversationKind::Public), InteractionKind::Invalid);
    }

    #[test]
    fn test_member_events() {
        let i = convert(
            &conv(),
            ConversationKind::Public,
            &raw(&[("id", "m"), ("type", "member"), ("action", "join"), ("uri", "sip:carol")]),
        )
        .unwrap();
        assert_eq!(
            i.body,
            InteractionBody::Contact {
                member: Uri::parse("sip:carol"),
                action: ContactAction::Joined
            }
        );
        let bad = [("id", "m"), ("type", "member"), ("action", "dance"), ("uri", "x")];
        assert_eq!(kind_of(&bad, ConversationKind::Public), InteractionKind::Invalid);
    }

    #[test]
    fn test_malformed_transfer_degrades() {
        let ok = [
            ("id", "f"),
            ("type", "application/data-transfer+json"),
            ("fileId", "abc"),
            ("displayName", "a.png"),
            ("totalSize", "42"),
        ];
        assert_eq!(kind_of(&ok, ConversationKind::Public), InteractionKind::DataTransfer);
        let bad = [
            ("id", "f"),
            ("type", "application/data-transfer+json"),
            ("fileId", "abc"),
            ("displayName", "a.png"),
            ("totalSize", "lots"),
        ];
        assert_eq!(kind_of(&bad, ConversationKind::Public), InteractionKind::Invalid);
    }

    #[test]
    fn test_call_history() {
        let i = convert(
            &conv(),
            ConversationKind::Public,
            &raw(&[
                ("id", "c"),
                ("type", "application/call-history+json"),
                ("duration", "5000"),
                ("confId", "conf1"),
            ]),
        )
        .unwrap();
        assert_eq!(i.call_record(), Some((5000, Some(&ConferenceId::from("conf1")))));
    }

    #[test]
    fn test_unsupported_types_are_invalid() {
        for t in ["merge", "application/update-profile", "vote", ""] {
            assert_eq!(
                kind_of(&[("id", "x"), ("type", t)], ConversationKind::Public),
                InteractionKind::Invalid
            );
        }
    }

    #[test]
    fn test_missing_id_is_dropped() {
        assert!(convert(&conv(), ConversationKind::Public, &raw(&[("type", "text/plain")])).is_none());
    }

    #[test]
    fn test_edit_and_reaction_links() {
        let edit = convert(
            &conv(),
            ConversationKind::Public,
            &raw(&[("id", "e"), ("type", "application/edited-message"), ("edit", "m1"), ("body", "fixed")]),
        )
        .unwrap();
        assert!(edit.is_edit());
        assert_eq!(edit.raw_text(), Some("fixed"));

        let reaction = convert(
            &conv(),
            ConversationKind::Public,
            &raw(&[("id", "r"), ("type", "text/plain"), ("react-to", "m1"), ("body", "👍")]),
        )
        .unwrap();
        assert!(reaction.is_reaction());
    }
}
