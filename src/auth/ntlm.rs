//! NTLM over HTTP.
//!
//! The client sends a `NEGOTIATE` (Type 1) message, the server answers with a `CHALLENGE`
//! (Type 2) message, and the client completes with an NTLMv2 `AUTHENTICATE` (Type 3) message.
//!
//! [MS-NLMP](https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-nlmp)
use super::AuthError;
use super::hash::{hmac_md5, md4};

const SIGNATURE: &[u8; 8] = b"NTLMSSP\0";

const NEGOTIATE_UNICODE: u32 = 0x0000_0001;
const NEGOTIATE_OEM: u32 = 0x0000_0002;
const REQUEST_TARGET: u32 = 0x0000_0004;
const NEGOTIATE_NTLM: u32 = 0x0000_0200;
const NEGOTIATE_ALWAYS_SIGN: u32 = 0x0000_8000;
const NEGOTIATE_EXTENDED_SESSIONSECURITY: u32 = 0x0008_0000;
const NEGOTIATE_128: u32 = 0x2000_0000;
const NEGOTIATE_56: u32 = 0x8000_0000;

const CLIENT_FLAGS: u32 = NEGOTIATE_UNICODE
    | NEGOTIATE_OEM
    | REQUEST_TARGET
    | NEGOTIATE_NTLM
    | NEGOTIATE_ALWAYS_SIGN
    | NEGOTIATE_EXTENDED_SESSIONSECURITY
    | NEGOTIATE_128
    | NEGOTIATE_56;

/// `MsvAvTimestamp` AV_PAIR id.
const AV_TIMESTAMP: u16 = 7;
const AV_EOL: u16 = 0;

/// Seconds between 1601-01-01 and 1970-01-01.
const FILETIME_EPOCH_OFFSET: u64 = 11_644_473_600;

/// Parsed `CHALLENGE` (Type 2) message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeMessage {
    pub flags: u32,
    pub server_challenge: [u8; 8],
    pub target_info: Vec<u8>,
}

/// Build the `NEGOTIATE` (Type 1) message.
pub fn negotiate() -> Vec<u8> {
    let mut msg = Vec::with_capacity(32);
    msg.extend_from_slice(SIGNATURE);
    msg.extend_from_slice(&1u32.to_le_bytes());
    msg.extend_from_slice(&CLIENT_FLAGS.to_le_bytes());
    // empty domain and workstation
    put_security_buffer(&mut msg, 0, 32);
    put_security_buffer(&mut msg, 0, 32);
    msg
}

/// Parse a `CHALLENGE` (Type 2) message.
pub fn parse_challenge(msg: &[u8]) -> Result<ChallengeMessage, AuthError> {
    const INVALID: AuthError = AuthError::InvalidChallenge("malformed NTLM challenge message");

    if msg.len() < 32 || &msg[..8] != SIGNATURE || read_u32(msg, 8) != Some(2) {
        return Err(INVALID);
    }
    let flags = read_u32(msg, 20).ok_or(INVALID)?;
    let mut server_challenge = [0u8; 8];
    server_challenge.copy_from_slice(&msg[24..32]);

    // target info is absent in old style messages
    let target_info = if msg.len() >= 48 {
        let len = usize::from(read_u16(msg, 40).ok_or(INVALID)?);
        let offset = read_u32(msg, 44).ok_or(INVALID)? as usize;
        msg.get(offset..offset + len).ok_or(INVALID)?.to_vec()
    } else {
        Vec::new()
    };

    Ok(ChallengeMessage {
        flags,
        server_challenge,
        target_info,
    })
}

/// `NTOWFv1`, MD4 of the UTF-16LE password.
pub fn ntowf_v1(password: &str) -> [u8; 16] {
    md4(&utf16le(password))
}

/// `NTOWFv2`, HMAC-MD5 of uppercase username and domain keyed with `NTOWFv1`.
pub fn ntowf_v2(username: &str, password: &str, domain: &str) -> [u8; 16] {
    let identity = format!("{}{domain}", username.to_uppercase());
    hmac_md5(&ntowf_v1(password), &utf16le(&identity))
}

/// Parameters of an `AUTHENTICATE` (Type 3) message.
#[derive(Debug)]
pub struct Authenticate<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub domain: &'a str,
    pub workstation: &'a str,
    pub client_challenge: [u8; 8],
    /// Windows FILETIME, used when the server does not provide one.
    pub timestamp: u64,
}

impl Authenticate<'_> {
    /// Build the `AUTHENTICATE` (Type 3) message answering `challenge`.
    pub fn encode(&self, challenge: &ChallengeMessage) -> Vec<u8> {
        let key = ntowf_v2(self.username, self.password, self.domain);
        let timestamp = av_timestamp(&challenge.target_info).unwrap_or(self.timestamp);

        // NTLMv2_CLIENT_CHALLENGE
        let mut temp = Vec::with_capacity(32 + challenge.target_info.len());
        temp.extend_from_slice(&[1, 1, 0, 0, 0, 0, 0, 0]);
        temp.extend_from_slice(&timestamp.to_le_bytes());
        temp.extend_from_slice(&self.client_challenge);
        temp.extend_from_slice(&[0; 4]);
        temp.extend_from_slice(&challenge.target_info);
        temp.extend_from_slice(&[0; 4]);

        let nt_proof = hmac_md5(&key, &[&challenge.server_challenge[..], &temp[..]].concat());
        let nt_response = [&nt_proof[..], &temp[..]].concat();

        let lm_proof = hmac_md5(
            &key,
            &[&challenge.server_challenge[..], &self.client_challenge[..]].concat(),
        );
        let lm_response = [&lm_proof[..], &self.client_challenge[..]].concat();

        let unicode = challenge.flags & NEGOTIATE_UNICODE != 0;
        let encode_str = |s: &str| if unicode { utf16le(s) } else { s.as_bytes().to_vec() };
        let domain = encode_str(self.domain);
        let user = encode_str(self.username);
        let workstation = encode_str(self.workstation);

        let flags = (challenge.flags & CLIENT_FLAGS & !(if unicode { NEGOTIATE_OEM } else { 0 }))
            | NEGOTIATE_NTLM;

        const HEADER_LEN: usize = 64;
        let mut offset = HEADER_LEN;
        let mut msg = Vec::with_capacity(
            HEADER_LEN
                + lm_response.len()
                + nt_response.len()
                + domain.len()
                + user.len()
                + workstation.len(),
        );
        msg.extend_from_slice(SIGNATURE);
        msg.extend_from_slice(&3u32.to_le_bytes());

        // payload order: lm, nt, domain, user, workstation
        for field in [&lm_response, &nt_response, &domain, &user, &workstation] {
            put_security_buffer(&mut msg, field.len(), offset);
            offset += field.len();
        }
        // no session key
        put_security_buffer(&mut msg, 0, offset);
        msg.extend_from_slice(&flags.to_le_bytes());
        debug_assert_eq!(msg.len(), HEADER_LEN);

        for field in [lm_response, nt_response, domain, user, workstation] {
            msg.extend_from_slice(&field);
        }
        msg
    }
}

/// Current time as Windows FILETIME.
pub fn filetime_now() -> u64 {
    let unix = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    (unix.as_secs() + FILETIME_EPOCH_OFFSET) * 10_000_000 + u64::from(unix.subsec_nanos() / 100)
}

/// Find `MsvAvTimestamp` in target info.
fn av_timestamp(mut info: &[u8]) -> Option<u64> {
    while info.len() >= 4 {
        let id = read_u16(info, 0)?;
        let len = usize::from(read_u16(info, 2)?);
        let value = info.get(4..4 + len)?;
        match id {
            AV_EOL => return None,
            AV_TIMESTAMP if len == 8 => {
                return Some(u64::from_le_bytes(value.try_into().ok()?));
            }
            _ => info = &info[4 + len..],
        }
    }
    None
}

fn put_security_buffer(msg: &mut Vec<u8>, len: usize, offset: usize) {
    #[allow(clippy::cast_possible_truncation, reason = "NTLM fields are far below u16::MAX")]
    let len = len as u16;
    msg.extend_from_slice(&len.to_le_bytes());
    msg.extend_from_slice(&len.to_le_bytes());
    #[allow(clippy::cast_possible_truncation, reason = "NTLM messages are far below u32::MAX")]
    let offset = offset as u32;
    msg.extend_from_slice(&offset.to_le_bytes());
}

fn read_u16(bytes: &[u8], at: usize) -> Option<u16> {
    Some(u16::from_le_bytes(bytes.get(at..at + 2)?.try_into().ok()?))
}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    Some(u32::from_le_bytes(bytes.get(at..at + 4)?.try_into().ok()?))
}

fn utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::auth::hash::hex;

    fn challenge_message(flags: u32, target_info: &[u8]) -> Vec<u8> {
        let mut msg = Vec::new();
        msg.extend_from_slice(SIGNATURE);
        msg.extend_from_slice(&2u32.to_le_bytes());
        put_security_buffer(&mut msg, 0, 48);
        msg.extend_from_slice(&flags.to_le_bytes());
        msg.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        msg.extend_from_slice(&[0; 8]);
        put_security_buffer(&mut msg, target_info.len(), 48);
        msg.extend_from_slice(target_info);
        msg
    }

    #[test]
    fn ms_nlmp_test_vectors() {
        assert_eq!(hex(&ntowf_v1("Password")), "a4f49c406510bdcab6824ee7c30fd852");
        assert_eq!(hex(&ntowf_v2("User", "Password", "Domain")), "0c868a403bfd7a93a3001ef22ef02e3f");
    }

    #[test]
    fn negotiate_message() {
        let msg = negotiate();
        assert_eq!(msg.len(), 32);
        assert_eq!(&msg[..8], b"NTLMSSP\0");
        assert_eq!(read_u32(&msg, 8), Some(1));
        assert_eq!(read_u32(&msg, 12), Some(CLIENT_FLAGS));
    }

    #[test]
    fn challenge_and_authenticate() {
        let mut info = Vec::new();
        info.extend_from_slice(&AV_TIMESTAMP.to_le_bytes());
        info.extend_from_slice(&8u16.to_le_bytes());
        info.extend_from_slice(&42u64.to_le_bytes());
        info.extend_from_slice(&[0; 4]);

        let challenge = parse_challenge(&challenge_message(NEGOTIATE_UNICODE | NEGOTIATE_NTLM, &info)).unwrap();
        assert_eq!(challenge.server_challenge, [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(challenge.target_info, info);
        assert_eq!(av_timestamp(&challenge.target_info), Some(42));

        let msg = Authenticate {
            username: "user",
            password: "pass",
            domain: "DOM",
            workstation: "",
            client_challenge: [9; 8],
            timestamp: 0,
        }
        .encode(&challenge);

        assert_eq!(&msg[..8], b"NTLMSSP\0");
        assert_eq!(read_u32(&msg, 8), Some(3));

        // lm response: 16 bytes proof + 8 bytes client challenge
        assert_eq!(read_u16(&msg, 12), Some(24));
        assert_eq!(read_u32(&msg, 16), Some(64));
        // nt response: 16 bytes proof + 28 bytes header + target info + 4
        let nt_len = usize::from(read_u16(&msg, 20).unwrap());
        assert_eq!(nt_len, 16 + 28 + info.len() + 4);

        // user name in UTF-16LE
        let user_len = usize::from(read_u16(&msg, 36).unwrap());
        let user_off = read_u32(&msg, 40).unwrap() as usize;
        assert_eq!(&msg[user_off..user_off + user_len], &utf16le("user")[..]);

        // timestamp taken from target info
        let nt_off = read_u32(&msg, 24).unwrap() as usize;
        assert_eq!(&msg[nt_off + 24..nt_off + 32], &42u64.to_le_bytes());
    }

    #[test]
    fn rejects_malformed_challenge() {
        assert!(parse_challenge(b"NTLMSSP\0").is_err());
        let mut msg = challenge_message(0, &[]);
        msg[8] = 3;
        assert!(parse_challenge(&msg).is_err());
        let mut msg = challenge_message(0, &[1, 2, 3]);
        msg.truncate(49);
        assert!(parse_challenge(&msg).is_err());
    }
}
