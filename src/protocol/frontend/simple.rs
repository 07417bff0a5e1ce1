//! Query message.

use crate::protocol::codec::MessageBuilder;

/// Append a Query ('Q') message carrying `sql`.
///
/// `sql` is sent as-is. It may hold several statements, and an empty string
/// is answered with EmptyQueryResponse.
pub fn write_query(buf: &mut Vec<u8>, sql: &str) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::QUERY);
    msg.write_cstr(sql);
    msg.finish();
}
