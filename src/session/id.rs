use base64::prelude::BASE64_URL_SAFE_NO_PAD;
use base64::{DecodeError, DecodeSliceError, Engine};
use rand::TryRngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::{self, FromStr};

/// Length of an encoded [`Id`].
pub const ENCODED_LEN: usize = 22;

/// A session identifier: 16 bytes from the OS random source, rendered as
/// URL-safe base64 without padding.
#[derive(Copy, Clone, Debug, Deserialize, Serialize, Eq, Hash, PartialEq)]
pub struct Id([u8; 16]);

impl Id {
    /// Generates a fresh random id.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        OsRng
            .try_fill_bytes(&mut bytes)
            .expect("the OS random source must be available");
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::generate()
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut encoded = [0; ENCODED_LEN];
        BASE64_URL_SAFE_NO_PAD
            .encode_slice(self.0, &mut encoded)
            .expect("Encoded ID must be exactly 22 bytes");
        let encoded = str::from_utf8(&encoded).expect("Encoded ID must be valid UTF-8");

        f.write_str(encoded)
    }
}

impl FromStr for Id {
    type Err = DecodeSliceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != ENCODED_LEN {
            return Err(DecodeSliceError::DecodeError(DecodeError::InvalidLength(
                s.len(),
            )));
        }

        let mut decoded = [0; 16];
        let bytes_decoded = BASE64_URL_SAFE_NO_PAD.decode_slice(s.as_bytes(), &mut decoded)?;
        if bytes_decoded != 16 {
            let err = DecodeError::InvalidLength(bytes_decoded);
            return Err(DecodeSliceError::DecodeError(err));
        }

        Ok(Self(decoded))
    }
}
