//! What a state machine asks its driver to do next.

use crate::error::{ErrorFields, Result};
use crate::protocol::backend::{NoticeResponse, NotificationResponse, ParameterStatus, msg_type};

/// Next I/O step requested by [`StateMachine::step`](super::StateMachine::step).
///
/// After performing it the driver calls `step()` again, with the message it
/// read (if any) in the buffer set.
#[derive(Debug)]
pub enum Action {
    /// Read one message into `type_byte`/`read_buffer`.
    ReadMessage,
    /// Flush `write_buffer`, then read one message.
    WriteAndReadMessage,
    /// Deliver an out-of-band message, then read the next one.
    HandleAsyncMessageAndReadMessage(AsyncMessage),
    /// Exchange complete.
    Finished,
}

/// Message the server may send at any point in a session.
#[derive(Debug, Clone)]
pub enum AsyncMessage {
    /// LISTEN/NOTIFY delivery
    Notification {
        pid: u32,
        channel: String,
        payload: String,
    },
    /// NoticeResponse: a warning or informational message
    Notice(ErrorFields),
    /// ParameterStatus: a run-time parameter changed
    ParameterChanged { name: String, value: String },
}

impl AsyncMessage {
    /// Parse `payload` if `type_byte` is one of the asynchronous messages.
    ///
    /// Returns `Ok(None)` for every other message type.
    pub fn parse(type_byte: u8, payload: &[u8]) -> Result<Option<Self>> {
        let msg = match type_byte {
            msg_type::NOTICE_RESPONSE => Self::Notice(NoticeResponse::parse(payload)?.fields),
            msg_type::PARAMETER_STATUS => {
                let param = ParameterStatus::parse(payload)?;
                Self::ParameterChanged {
                    name: param.name.to_string(),
                    value: param.value.to_string(),
                }
            }
            msg_type::NOTIFICATION_RESPONSE => {
                let notification = NotificationResponse::parse(payload)?;
                Self::Notification {
                    pid: notification.pid,
                    channel: notification.channel.to_string(),
                    payload: notification.payload.to_string(),
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(msg))
    }
}
