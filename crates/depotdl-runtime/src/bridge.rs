//! Supervisor-side half of the interactive authentication exchange.
//!
//! When the session decodes an authentication verb it hands the message
//! here: the configured [`Authenticator`] produces the answer and exactly
//! one newline-terminated line goes back down the worker's stdin. The
//! worker blocks on that line before emitting anything else, so exchanges
//! are naturally serialized.

use depotdl_core::WorkerError;
use depotdl_core::ports::Authenticator;
use depotdl_core::protocol::ControlMessage;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Answer one authentication challenge over `input`.
///
/// Fails with the underlying broken-pipe error when the worker is already
/// gone; a challenge is never acknowledged silently.
pub(crate) async fn respond<W>(
    message: &ControlMessage,
    authenticator: &dyn Authenticator,
    input: &mut W,
) -> Result<(), WorkerError>
where
    W: AsyncWrite + Unpin,
{
    let answer = match message {
        ControlMessage::DeviceCode { previous_incorrect } => authenticator
            .device_code(*previous_incorrect)
            .await
            .map_err(WorkerError::Authenticator)?,
        ControlMessage::EmailCode {
            email,
            previous_incorrect,
        } => authenticator
            .email_code(email, *previous_incorrect)
            .await
            .map_err(WorkerError::Authenticator)?,
        ControlMessage::DeviceConfirmation => {
            let confirmed = authenticator
                .confirm_device()
                .await
                .map_err(WorkerError::Authenticator)?;
            String::from(if confirmed { "true" } else { "false" })
        }
        ControlMessage::ReturnValue { .. } => {
            return Err(WorkerError::protocol(
                "set-return-value is not an authentication challenge",
            ));
        }
    };

    // A stray line break would feed the worker's next read with garbage.
    if answer.contains('\n') || answer.contains('\r') {
        return Err(WorkerError::Authenticator(anyhow::anyhow!(
            "authenticator answers must be a single line"
        )));
    }

    input.write_all(answer.as_bytes()).await?;
    input.write_all(b"\n").await?;
    input.flush().await?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mockall::mock;
    use mockall::predicate::eq;
    use tokio::io::AsyncReadExt;

    mock! {
        Auth {}

        #[async_trait]
        impl Authenticator for Auth {
            async fn device_code(&self, previous_incorrect: bool) -> anyhow::Result<String>;
            async fn email_code(
                &self,
                email: &str,
                previous_incorrect: bool,
            ) -> anyhow::Result<String>;
            async fn confirm_device(&self) -> anyhow::Result<bool>;
        }
    }

    #[tokio::test]
    async fn test_device_code_is_requested_once_and_answered_with_newline() {
        let mut auth = MockAuth::new();
        auth.expect_device_code()
            .with(eq(true))
            .times(1)
            .returning(|_| Ok("ABC123".to_string()));

        let (mut writer, mut reader) = tokio::io::duplex(64);
        respond(
            &ControlMessage::DeviceCode {
                previous_incorrect: true,
            },
            &auth,
            &mut writer,
        )
        .await
        .unwrap();
        drop(writer);

        let mut answer = String::new();
        reader.read_to_string(&mut answer).await.unwrap();
        assert_eq!(answer, "ABC123\n");
    }

    #[tokio::test]
    async fn test_email_code_passes_the_address_through() {
        let mut auth = MockAuth::new();
        auth.expect_email_code()
            .withf(|email, previous_incorrect| {
                email == "user@example.com" && !*previous_incorrect
            })
            .times(1)
            .returning(|_, _| Ok("XYZ789".to_string()));

        let (mut writer, mut reader) = tokio::io::duplex(64);
        respond(
            &ControlMessage::EmailCode {
                email: "user@example.com".to_string(),
                previous_incorrect: false,
            },
            &auth,
            &mut writer,
        )
        .await
        .unwrap();
        drop(writer);

        let mut answer = String::new();
        reader.read_to_string(&mut answer).await.unwrap();
        assert_eq!(answer, "XYZ789\n");
    }

    #[tokio::test]
    async fn test_confirmation_answers_encode_as_bool_text() {
        for (confirmed, expected) in [(true, "true\n"), (false, "false\n")] {
            let mut auth = MockAuth::new();
            auth.expect_confirm_device()
                .times(1)
                .returning(move || Ok(confirmed));

            let (mut writer, mut reader) = tokio::io::duplex(64);
            respond(&ControlMessage::DeviceConfirmation, &auth, &mut writer)
                .await
                .unwrap();
            drop(writer);

            let mut answer = String::new();
            reader.read_to_string(&mut answer).await.unwrap();
            assert_eq!(answer, expected);
        }
    }

    #[tokio::test]
    async fn test_return_value_is_not_a_challenge() {
        // No expectations: touching the authenticator would panic.
        let auth = MockAuth::new();

        let (mut writer, _reader) = tokio::io::duplex(64);
        let err = respond(
            &ControlMessage::ReturnValue {
                payload: "587726".to_string(),
            },
            &auth,
            &mut writer,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, WorkerError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_multi_line_answers_are_refused() {
        let mut auth = MockAuth::new();
        auth.expect_device_code()
            .returning(|_| Ok("ABC\ninjected".to_string()));

        let (mut writer, mut reader) = tokio::io::duplex(64);
        let err = respond(
            &ControlMessage::DeviceCode {
                previous_incorrect: false,
            },
            &auth,
            &mut writer,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, WorkerError::Authenticator(_)));

        // Nothing reached the worker.
        drop(writer);
        let mut rest = String::new();
        reader.read_to_string(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_authenticator_failures_propagate() {
        let mut auth = MockAuth::new();
        auth.expect_confirm_device()
            .returning(|| Err(anyhow::anyhow!("prompt closed")));

        let (mut writer, _reader) = tokio::io::duplex(64);
        let err = respond(&ControlMessage::DeviceConfirmation, &auth, &mut writer)
            .await
            .unwrap_err();

        assert!(matches!(err, WorkerError::Authenticator(_)));
    }
}
