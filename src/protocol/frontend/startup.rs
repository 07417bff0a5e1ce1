//! Session open and close.

use crate::opts::ConnectionParams;
use crate::protocol::codec::MessageBuilder;

/// Protocol 3.0: major version in the high 16 bits, minor in the low.
pub const PROTOCOL_VERSION: i32 = 3 << 16;

/// Encoding requested for every session; text columns decode as UTF-8.
pub const CLIENT_ENCODING: &str = "UTF8";

/// Append the untyped StartupMessage for `params`.
///
/// Sends `user`, `database`, `application_name` and `client_encoding`, then
/// the empty-name terminator.
pub fn write_startup(buf: &mut Vec<u8>, params: &ConnectionParams) {
    let mut msg = MessageBuilder::new_startup(buf);
    msg.write_i32(PROTOCOL_VERSION);
    for (name, value) in [
        ("user", params.user.as_str()),
        ("database", params.database.as_str()),
        ("application_name", params.application_name.as_str()),
        ("client_encoding", CLIENT_ENCODING),
    ] {
        msg.write_cstr(name);
        msg.write_cstr(value);
    }
    msg.write_u8(0);
    msg.finish();
}

/// Append a Terminate ('X') message.
pub fn write_terminate(buf: &mut Vec<u8>) {
    MessageBuilder::new(buf, super::msg_type::TERMINATE).finish();
}
