//! Password responses.

use md5::{Digest, Md5};

use crate::protocol::codec::MessageBuilder;

/// Append a PasswordMessage ('p').
///
/// Carries the cleartext password or the output of [`md5_password`].
pub fn write_password(buf: &mut Vec<u8>, password: &str) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::PASSWORD);
    msg.write_cstr(password);
    msg.finish();
}

/// Answer to an MD5 challenge: `"md5" + hex(md5(hex(md5(password + user)) + salt))`.
pub fn md5_password(user: &str, password: &str, salt: &[u8; 4]) -> String {
    let inner = Md5::new()
        .chain_update(password)
        .chain_update(user)
        .finalize();
    let outer = Md5::new()
        .chain_update(format!("{inner:x}"))
        .chain_update(salt)
        .finalize();
    format!("md5{outer:x}")
}
