//! Framing codec for the worker control channel.
//!
//! The worker embeds control messages in its ordinary stdout text, one per
//! line. A control line is the magic marker, then the verb, then the verb's
//! arguments, all joined by a NUL delimiter:
//!
//! ```text
//! $DDSPMM*<NUL>request-device-code<NUL>false
//! $DDSPMM*<NUL>request-email-code<NUL>user@example.com<NUL>true
//! $DDSPMM*<NUL>request-device-confirmation
//! $DDSPMM*<NUL>set-return-value<NUL>587726
//! ```
//!
//! NUL never occurs in log text or in marshalled JSON, so the framing cannot
//! collide with ordinary output. Lines without the marker-plus-delimiter
//! prefix are not control traffic; [`try_decode`] returns `Ok(None)` for
//! them. Lines that carry the prefix but fail to parse are reported as a
//! [`DecodeError`] so the supervisor can log and re-surface them instead of
//! acting on them.

use thiserror::Error;

// ============================================================================
// Constants
// ============================================================================

/// Marker that opens every control line.
pub const MAGIC_MARKER: &str = "$DDSPMM*";

/// Separator between the marker, the verb, and each argument.
pub const DELIMITER: char = '\0';

const VERB_DEVICE_CODE: &str = "request-device-code";
const VERB_EMAIL_CODE: &str = "request-email-code";
const VERB_DEVICE_CONFIRMATION: &str = "request-device-confirmation";
const VERB_RETURN_VALUE: &str = "set-return-value";

// ============================================================================
// Error Types
// ============================================================================

/// Errors from decoding a line that carries the control prefix.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("control line has no verb")]
    MissingVerb,

    #[error("unknown control verb: {0}")]
    UnknownVerb(String),

    #[error("missing required argument: {0}")]
    MissingArgument(&'static str),

    #[error("argument '{field}' is not a boolean: {value}")]
    InvalidBool { field: &'static str, value: String },
}

/// Errors from encoding a control message.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum EncodeError {
    #[error("argument of '{verb}' contains a delimiter or line break")]
    IllegalArgument { verb: &'static str },
}

// ============================================================================
// Control Messages
// ============================================================================

/// A decoded control line.
///
/// The three `request-*` verbs are authentication challenges the worker
/// blocks on; `set-return-value` delivers the marshalled result of the
/// request. The payload stays in wire form here, opaque to the codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// Worker needs a two-factor code from an authenticator app.
    DeviceCode { previous_incorrect: bool },

    /// Worker needs the code sent to the account's email address.
    EmailCode {
        email: String,
        previous_incorrect: bool,
    },

    /// Worker asks whether the login was confirmed on another device.
    DeviceConfirmation,

    /// Worker delivers the request's return value.
    ReturnValue { payload: String },
}

impl ControlMessage {
    const fn verb(&self) -> &'static str {
        match self {
            Self::DeviceCode { .. } => VERB_DEVICE_CODE,
            Self::EmailCode { .. } => VERB_EMAIL_CODE,
            Self::DeviceConfirmation => VERB_DEVICE_CONFIRMATION,
            Self::ReturnValue { .. } => VERB_RETURN_VALUE,
        }
    }

    /// Encode the message as a single control line, without the trailing
    /// newline.
    ///
    /// Fails if an argument contains the delimiter or a line break, which
    /// would desync the framing.
    pub fn encode(&self) -> Result<String, EncodeError> {
        let mut fields: Vec<&str> = vec![self.verb()];
        match self {
            Self::DeviceCode { previous_incorrect } => {
                fields.push(encode_bool(*previous_incorrect));
            }
            Self::EmailCode {
                email,
                previous_incorrect,
            } => {
                fields.push(email);
                fields.push(encode_bool(*previous_incorrect));
            }
            Self::DeviceConfirmation => {}
            Self::ReturnValue { payload } => fields.push(payload),
        }

        for field in &fields {
            if field.contains(DELIMITER) || field.contains('\n') || field.contains('\r') {
                return Err(EncodeError::IllegalArgument { verb: self.verb() });
            }
        }

        let mut line = String::from(MAGIC_MARKER);
        for field in &fields {
            line.push(DELIMITER);
            line.push_str(field);
        }
        Ok(line)
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode a single line of worker stdout.
///
/// # Returns
///
/// - `Ok(None)` when the line is ordinary output (no control prefix).
/// - `Ok(Some(message))` for a well-formed control line.
/// - `Err(DecodeError)` for a line that carries the prefix but is
///   malformed or uses an unknown verb.
///
/// Arguments beyond a verb's arity are ignored so that newer workers can
/// extend messages without breaking older supervisors. Decoding is pure:
/// the same line always yields the same result.
pub fn try_decode(line: &str) -> Result<Option<ControlMessage>, DecodeError> {
    let Some(rest) = line.strip_prefix(MAGIC_MARKER) else {
        return Ok(None);
    };
    let Some(rest) = rest.strip_prefix(DELIMITER) else {
        return Ok(None);
    };

    let mut parts = rest.split(DELIMITER);
    let verb = parts.next().unwrap_or_default();
    if verb.is_empty() {
        return Err(DecodeError::MissingVerb);
    }
    let args: Vec<&str> = parts.collect();

    let message = match verb {
        VERB_DEVICE_CODE => ControlMessage::DeviceCode {
            previous_incorrect: bool_arg(&args, 0, "previous_incorrect")?,
        },
        VERB_EMAIL_CODE => ControlMessage::EmailCode {
            email: arg(&args, 0, "email")?.to_string(),
            previous_incorrect: bool_arg(&args, 1, "previous_incorrect")?,
        },
        VERB_DEVICE_CONFIRMATION => ControlMessage::DeviceConfirmation,
        VERB_RETURN_VALUE => ControlMessage::ReturnValue {
            payload: arg(&args, 0, "payload")?.to_string(),
        },
        other => return Err(DecodeError::UnknownVerb(other.to_string())),
    };
    Ok(Some(message))
}

fn arg<'a>(args: &[&'a str], index: usize, name: &'static str) -> Result<&'a str, DecodeError> {
    args.get(index)
        .copied()
        .ok_or(DecodeError::MissingArgument(name))
}

fn bool_arg(args: &[&str], index: usize, name: &'static str) -> Result<bool, DecodeError> {
    match arg(args, index, name)? {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(DecodeError::InvalidBool {
            field: name,
            value: other.to_string(),
        }),
    }
}

const fn encode_bool(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

// ============================================================================
// Tests
// ============================================================================
