/// Result of an incremental parse step.
#[derive(Debug)]
pub enum ParseResult<T, E> {
    /// Bytes is not sufficient for parsing, more IO read is required.
    Pending,
    /// Parse success.
    Ok(T),
    /// Parse failed.
    Err(E),
}

impl<T, E> ParseResult<T, E> {
    /// Returns `true` if the parse result is [`Pending`].
    ///
    /// [`Pending`]: ParseResult::Pending
    #[inline]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

}

/// Unwrap `ParseResult::Ok`, returning early on `Pending` or `Err`.
macro_rules! ready {
    ($e:expr) => {
        match $e {
            $crate::common::ParseResult::Ok(ok) => ok,
            $crate::common::ParseResult::Pending => return $crate::common::ParseResult::Pending,
            $crate::common::ParseResult::Err(err) => {
                return $crate::common::ParseResult::Err(err.into())
            }
        }
    };
}

pub(crate) use ready;

/// Parse ASCII decimal digits into unsigned integer, rejecting sign, whitespace and overflow.
pub(crate) fn atou(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() {
        return None;
    }
    let mut value = 0u64;
    for &b in bytes {
        if !b.is_ascii_digit() {
            return None;
        }
        value = value.checked_mul(10)?.checked_add(u64::from(b - b'0'))?;
    }
    Some(value)
}
