//! Framed transport and message catalogs (component C7): carries the
//! BA-facing protocol and the embedded protocol spoken with an elevated
//! or embedded child process over a Unix domain socket.

mod codec;
mod elevated;
mod log_redirect;
mod message;
mod transport;

pub use elevated::{ElevatedRequest, ElevatedResponse};
pub use log_redirect::LogRedirect;
pub use message::{decode_embedded, encode_embedded, BaMessage, BaRequest, BaResponse, BA_API_VERSION};
pub use transport::{bind_unix, FramedTransport};

#[cfg(test)]
mod tests {
    use super::*;
    use engine_exec::{EmbeddedMessage, LogLevel};
    use engine_model::CurrentState;
    use tokio::net::UnixStream;

    #[test]
    fn ba_message_round_trips() {
        let message = BaMessage::DetectPackageComplete {
            package_id: "ExeA".to_string(),
            state: CurrentState::Present,
        };
        let bytes = message.encode();
        assert_eq!(BaMessage::decode(&bytes).unwrap(), message);
    }

    #[test]
    fn ba_error_message_round_trips() {
        let message = BaMessage::Error {
            package_id: "MsiA".to_string(),
            code: 1603,
            message: "install failed".to_string(),
        };
        let bytes = message.encode();
        assert_eq!(BaMessage::decode(&bytes).unwrap(), message);
    }

    #[test]
    fn embedded_progress_round_trips() {
        let message = EmbeddedMessage::Progress { progress_percentage: 40, overall_percentage: 10 };
        let bytes = encode_embedded(&message);
        assert_eq!(decode_embedded(&bytes).unwrap(), message);
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        let mut bytes = BaMessage::DetectBegin.encode();
        bytes.push(0xff);
        assert!(BaMessage::decode(&bytes).is_err());
    }

    #[test]
    fn decode_rejects_unknown_tag() {
        assert!(BaMessage::decode(&[200]).is_err());
    }

    #[tokio::test]
    async fn framed_transport_round_trips_over_a_socket_pair() {
        let (a, b) = UnixStream::pair().unwrap();
        let mut client = FramedTransport::new(a);
        let mut server = FramedTransport::new(b);

        let message = BaMessage::ApplyPackageComplete { package_id: "ExeA".to_string(), code: 0 };
        client.send(&message.encode()).await.unwrap();

        let received = server.recv().await.unwrap().expect("frame present");
        assert_eq!(BaMessage::decode(&received).unwrap(), message);
    }

    #[tokio::test]
    async fn recv_returns_none_on_clean_close() {
        let (a, b) = UnixStream::pair().unwrap();
        drop(a);
        let mut server = FramedTransport::new(b);
        assert!(server.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn bind_unix_accepts_a_connection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.sock");
        let listener = bind_unix(&path).await.unwrap();

        let path_for_client = path.clone();
        let client = tokio::spawn(async move { UnixStream::connect(path_for_client).await.unwrap() });

        let (_server_stream, _addr) = listener.accept().await.unwrap();
        client.await.unwrap();
    }

    #[test]
    fn ba_request_round_trips_each_shape() {
        let requests = vec![
            BaRequest::GetPackageCount,
            BaRequest::GetVariableString { name: "InstallFolder".to_string() },
            BaRequest::SetVariableNumeric { name: "Progress".to_string(), value: 42 },
            BaRequest::FormatString { template: "[InstallFolder]\\app.exe".to_string() },
            BaRequest::EvaluateCondition { condition: "VersionNT >= v6.1".to_string() },
            BaRequest::Plan { action: 1 },
            BaRequest::Quit { exit_code: 0 },
            BaRequest::CompareVersions { left: "1.2.0".to_string(), right: "1.10.0".to_string() },
            BaRequest::GetRelatedBundleVariable {
                bundle_code: "{Related}".to_string(),
                name: "Version".to_string(),
            },
        ];
        for request in requests {
            let bytes = request.encode();
            assert_eq!(BaRequest::decode(&bytes).unwrap(), request);
        }
    }

    #[test]
    fn ba_request_with_unknown_api_version_decodes_as_unsupported() {
        let mut bytes = BaRequest::Detect.encode();
        bytes[0] = 0xff; // corrupt the low byte of the little-endian version prefix
        assert_eq!(BaRequest::decode(&bytes).unwrap(), BaRequest::UnsupportedVersion { version: 0x000000ff });
    }

    #[test]
    fn ba_request_decode_rejects_unknown_tag() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&BA_API_VERSION.to_le_bytes());
        bytes.push(250);
        assert!(BaRequest::decode(&bytes).is_err());
    }

    #[test]
    fn ba_response_round_trips_success_and_failure() {
        let ok = BaResponse::ok(b"1.2.3".to_vec());
        assert_eq!(BaResponse::decode(&ok.encode()).unwrap(), ok);

        let failure = BaResponse::failure(-2147024894); // E_FILENOTFOUND
        assert_eq!(BaResponse::decode(&failure.encode()).unwrap(), failure);
    }

    #[tokio::test]
    async fn log_redirect_forwards_as_embedded_log() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(4);
        let redirect = LogRedirect::new(tx);
        redirect.forward(log::Level::Error, "disk full".to_string());

        let message = rx.recv().await.unwrap();
        assert!(matches!(
            message,
            EmbeddedMessage::Log { level: LogLevel::Error, .. }
        ));
    }
}
