//! Unix-socket transport between CLI invocations and the resident watchdog.
//!
//! One JSON line per request and one per response. The caller's identity is
//! never part of the message; the listener takes it from the socket's peer
//! credentials.
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::{self, BufRead, BufReader, Write},
    os::unix::{
        fs::PermissionsExt,
        net::{UnixListener, UnixStream},
    },
    path::Path,
    time::Duration,
};
use thiserror::Error;

use crate::control::{Caller, ControlCommand, ControlResponse};

/// How long a client waits for the watchdog to answer.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(120);

/// Owner and group may connect; everyone else is refused by the filesystem.
const SOCKET_MODE: u32 = 0o660;

/// Message sent from CLI invocations to the resident watchdog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRequest {
    pub command: ControlCommand,
}

/// Errors raised by the control channel helpers.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("control socket I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("failed to serialise control message: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("watchdog reported error: {0}")]
    Server(String),
    #[error("control socket not available")]
    NotAvailable,
}

/// Sends a request to the watchdog and waits for a response.
pub fn send_request(
    socket: &Path,
    request: &ControlRequest,
) -> Result<ControlResponse, ControlError> {
    if !socket.exists() {
        return Err(ControlError::NotAvailable);
    }

    let mut stream = match UnixStream::connect(socket) {
        Ok(stream) => stream,
        Err(err) if err.kind() == io::ErrorKind::ConnectionRefused => {
            return Err(ControlError::NotAvailable);
        }
        Err(err) => return Err(err.into()),
    };
    stream.set_read_timeout(Some(CLIENT_TIMEOUT))?;

    let payload = serde_json::to_vec(request)?;
    stream.write_all(&payload)?;
    stream.write_all(b"\n")?;
    stream.flush()?;

    let mut reader = BufReader::new(stream);
    let mut response_line = String::new();
    reader.read_line(&mut response_line)?;

    if response_line.trim().is_empty() {
        return Err(ControlError::NotAvailable);
    }

    let response: ControlResponse = serde_json::from_str(response_line.trim())?;
    if let ControlResponse::Error(message) = &response {
        return Err(ControlError::Server(message.clone()));
    }

    Ok(response)
}

/// Reads a request from a connected client.
pub fn read_request(stream: &mut UnixStream) -> Result<ControlRequest, ControlError> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line)?;

    if line.trim().is_empty() {
        return Err(ControlError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "empty control request",
        )));
    }

    Ok(serde_json::from_str(line.trim())?)
}

/// Writes a response to the connected client.
pub fn write_response(
    stream: &mut UnixStream,
    response: &ControlResponse,
) -> Result<(), ControlError> {
    let payload = serde_json::to_vec(response)?;
    stream.write_all(&payload)?;
    stream.write_all(b"\n")?;
    stream.flush()?;
    Ok(())
}

/// Identifies the process on the other end of `stream` from its kernel credentials.
///
/// The uid becomes the caller's user id and the primary gid its only role.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn peer_caller(stream: &UnixStream) -> Result<Caller, ControlError> {
    use nix::sys::socket::{getsockopt, sockopt::PeerCredentials};

    let credentials =
        getsockopt(stream, PeerCredentials).map_err(|err| ControlError::Io(err.into()))?;
    Ok(Caller {
        user_id: u64::from(credentials.uid()),
        role_ids: vec![u64::from(credentials.gid())],
    })
}

/// Identifies the process on the other end of `stream` from its kernel credentials.
#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub fn peer_caller(stream: &UnixStream) -> Result<Caller, ControlError> {
    let (uid, gid) =
        nix::unistd::getpeereid(stream).map_err(|err| ControlError::Io(err.into()))?;
    Ok(Caller {
        user_id: u64::from(uid.as_raw()),
        role_ids: vec![u64::from(gid.as_raw())],
    })
}

/// Binds the control socket, replacing a stale socket file.
pub fn bind(socket: &Path) -> Result<UnixListener, ControlError> {
    if let Some(parent) = socket.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    if socket.exists() {
        fs::remove_file(socket)?;
    }
    let listener = UnixListener::bind(socket)?;
    fs::set_permissions(socket, fs::Permissions::from_mode(SOCKET_MODE))?;
    Ok(listener)
}

/// Removes the socket file.
pub fn cleanup(socket: &Path) {
    if socket.exists() {
        let _ = fs::remove_file(socket);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::tempdir;

    #[test]
    fn request_and_response_round_trip_over_socket() {
        let dir = tempdir().unwrap();
        let socket = dir.path().join("run/control.sock");
        let listener = bind(&socket).unwrap();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let caller = peer_caller(&stream).unwrap();
            let request = read_request(&mut stream).unwrap();
            write_response(
                &mut stream,
                &ControlResponse::Message(format!("hello {}", caller.user_id)),
            )
            .unwrap();
            request
        });

        let request = ControlRequest {
            command: ControlCommand::Restart {
                reason: Some("deploy".into()),
            },
        };
        let uid = nix::unistd::getuid().as_raw();
        let response = send_request(&socket, &request).unwrap();
        assert_eq!(response, ControlResponse::Message(format!("hello {uid}")));
        assert_eq!(server.join().unwrap(), request);
    }

    #[test]
    fn identity_claims_in_the_payload_are_ignored() {
        let dir = tempdir().unwrap();
        let socket = dir.path().join("control.sock");
        let listener = bind(&socket).unwrap();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let caller = peer_caller(&stream).unwrap();
            let request = read_request(&mut stream).unwrap();
            write_response(&mut stream, &ControlResponse::Ok).unwrap();
            (caller, request)
        });

        let mut client = UnixStream::connect(&socket).unwrap();
        client
            .write_all(b"{\"caller\":{\"user_id\":4242,\"role_ids\":[7]},\"command\":\"Toggle\"}\n")
            .unwrap();
        let mut reply = String::new();
        BufReader::new(&client).read_line(&mut reply).unwrap();

        let (caller, request) = server.join().unwrap();
        assert_eq!(request.command, ControlCommand::Toggle);
        assert_eq!(caller.user_id, u64::from(nix::unistd::getuid().as_raw()));
        assert_eq!(caller.role_ids, vec![u64::from(nix::unistd::getgid().as_raw())]);
    }

    #[test]
    fn socket_is_not_world_accessible() {
        let dir = tempdir().unwrap();
        let socket = dir.path().join("control.sock");
        let _listener = bind(&socket).unwrap();
        let mode = fs::metadata(&socket).unwrap().permissions().mode();
        assert_eq!(mode & 0o007, 0);
    }

    #[test]
    fn error_response_becomes_server_error() {
        let dir = tempdir().unwrap();
        let socket = dir.path().join("control.sock");
        let listener = bind(&socket).unwrap();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            read_request(&mut stream).unwrap();
            write_response(&mut stream, &ControlResponse::Error("denied".into())).unwrap();
        });

        let request = ControlRequest {
            command: ControlCommand::Toggle,
        };
        let err = send_request(&socket, &request).unwrap_err();
        assert!(matches!(err, ControlError::Server(ref msg) if msg == "denied"));
        server.join().unwrap();
    }

    #[test]
    fn missing_socket_is_not_available() {
        let dir = tempdir().unwrap();
        let request = ControlRequest {
            command: ControlCommand::Status,
        };
        let err = send_request(&dir.path().join("absent.sock"), &request).unwrap_err();
        assert!(matches!(err, ControlError::NotAvailable));
    }

    #[test]
    fn bind_replaces_stale_socket_file() {
        let dir = tempdir().unwrap();
        let socket = dir.path().join("control.sock");
        fs::write(&socket, "stale").unwrap();
        assert!(bind(&socket).is_ok());
        cleanup(&socket);
        assert!(!socket.exists());
    }
}
