//! Turn item to event payload translation.
//!
//! Adapters speak `TurnItem`; the log speaks `EventPayload`. One item can
//! produce more than one payload (usage splits into tokens and cost).

use serde_json::json;

use tiller_protocol::{EventPayload, OutputKind, TurnItem};

/// Translate one raw adapter item into the event payloads it implies.
pub fn translate_item(item: TurnItem) -> Vec<EventPayload> {
    match item {
        TurnItem::Header {
            title,
            model,
            provider: _,
        } => {
            let text = match model {
                Some(model) => format!("{title} ({model})"),
                None => title,
            };
            vec![EventPayload::Header { text }]
        }
        TurnItem::Step { stream, text } => vec![EventPayload::Output {
            stream,
            text,
            kind: OutputKind::Step,
            is_final: false,
        }],
        TurnItem::Final { text } => vec![EventPayload::Output {
            stream: "combined".to_string(),
            text,
            kind: OutputKind::Final,
            is_final: true,
        }],
        TurnItem::Usage {
            input_tokens,
            output_tokens,
            cost_usd,
        } => {
            let mut payloads = vec![EventPayload::Metadata {
                key: "tokens".to_string(),
                value: json!({ "input": input_tokens, "output": output_tokens }),
                raw: format!("input: {input_tokens}, output: {output_tokens}"),
            }];
            if let Some(cost) = cost_usd {
                payloads.push(EventPayload::Metadata {
                    key: "cost".to_string(),
                    value: json!(cost),
                    raw: format!("${cost:.4}"),
                });
            }
            payloads
        }
        TurnItem::Fatal { code, message } => vec![EventPayload::Error { code, message }],
    }
}
