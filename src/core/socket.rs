// Copyright 2026 DroidVold Authors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Control socket plumbing: length-prefixed text frames, one command
//! thread per client, and the connected-client registry that doubles as
//! the 6xx broadcaster.

use std::{
    io::{self, Read, Write},
    os::unix::net::{UnixListener, UnixStream},
    sync::{Arc, Mutex},
    thread,
};

use crate::core::commands;
use crate::core::events::{Broadcaster, COMMAND_SYNTAX_ERROR};
use crate::core::manager::VolumeManager;

/// Frames larger than this are hostile, not commands.
const MAX_FRAME: u32 = 16 * 1024;

/// `<u32 big-endian length><utf8 text>`.
pub fn write_frame(stream: &mut impl Write, text: &str) -> io::Result<()> {
    let len = text.len() as u32;
    stream.write_all(&len.to_be_bytes())?;
    stream.write_all(text.as_bytes())?;
    stream.flush()
}

/// `Ok(None)` on a clean close between frames.
pub fn read_frame(stream: &mut impl Read) -> io::Result<Option<String>> {
    let mut header = [0u8; 4];
    match stream.read_exact(&mut header) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u32::from_be_bytes(header);
    if len > MAX_FRAME {
        return Err(io::Error::other(format!("oversized frame: {} bytes", len)));
    }
    let mut payload = vec![0u8; len as usize];
    stream.read_exact(&mut payload)?;
    String::from_utf8(payload)
        .map(Some)
        .map_err(|_| io::Error::other("frame is not valid utf8"))
}

/// Connected control clients; broadcasts fan out to every one of them.
pub struct ClientRegistry {
    clients: Mutex<Vec<(u64, UnixStream)>>,
    next_id: Mutex<u64>,
}

impl ClientRegistry {
    pub fn new() -> ClientRegistry {
        ClientRegistry {
            clients: Mutex::new(Vec::new()),
            next_id: Mutex::new(0),
        }
    }

    fn register(&self, stream: UnixStream) -> u64 {
        let mut next = self.next_id.lock().unwrap();
        let id = *next;
        *next += 1;
        self.clients.lock().unwrap().push((id, stream));
        id
    }

    fn unregister(&self, id: u64) {
        self.clients.lock().unwrap().retain(|(cid, _)| *cid != id);
    }

    fn send_all(&self, text: &str) {
        let mut clients = self.clients.lock().unwrap();
        clients.retain_mut(|(id, stream)| match write_frame(stream, text) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("dropping client {}: {}", id, e);
                false
            }
        });
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadcaster for ClientRegistry {
    fn broadcast(&self, code: u32, payload: &str) {
        self.send_all(&format!("{} {}", code, payload));
    }
}

/// Accept loop; never returns in steady state.
pub fn serve(
    listener: UnixListener,
    vm: Arc<Mutex<VolumeManager>>,
    registry: Arc<ClientRegistry>,
) -> io::Result<()> {
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let vm = vm.clone();
                let registry = registry.clone();
                thread::spawn(move || handle_client(stream, vm, registry));
            }
            Err(e) => log::warn!("accept failed: {}", e),
        }
    }
    Ok(())
}

fn handle_client(
    mut stream: UnixStream,
    vm: Arc<Mutex<VolumeManager>>,
    registry: Arc<ClientRegistry>,
) {
    let id = match stream.try_clone() {
        Ok(writer) => registry.register(writer),
        Err(e) => {
            log::warn!("failed to clone client stream: {}", e);
            return;
        }
    };
    log::debug!("client {} connected", id);

    loop {
        let line = match read_frame(&mut stream) {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                log::warn!("client {} read failed: {}", id, e);
                break;
            }
        };

        let (code, text) = match commands::tokenize(&line) {
            Some(argv) => commands::dispatch(&vm, &argv),
            None => (COMMAND_SYNTAX_ERROR, "Unclosed quote".to_owned()),
        };

        if write_frame(&mut stream, &format!("{} {}", code, text)).is_err() {
            break;
        }
    }

    registry.unregister(id);
    log::debug!("client {} disconnected", id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::{COMMAND_OKAY, DISK_CREATED};
    use crate::core::tests::{test_context, RecordingBroadcaster, ScriptedExec};
    use std::time::Duration;

    #[test]
    fn frame_round_trip() {
        let (mut a, mut b) = UnixStream::pair().unwrap();
        write_frame(&mut a, "volume reset").unwrap();
        assert_eq!(read_frame(&mut b).unwrap().as_deref(), Some("volume reset"));

        drop(a);
        assert_eq!(read_frame(&mut b).unwrap(), None);
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let (mut a, mut b) = UnixStream::pair().unwrap();
        a.write_all(&u32::MAX.to_be_bytes()).unwrap();
        assert!(read_frame(&mut b).is_err());
    }

    #[test]
    fn client_gets_response_and_broadcasts() {
        let ctx = test_context(
            Arc::new(ScriptedExec::default()),
            Arc::new(RecordingBroadcaster::default()),
        );
        let vm = Arc::new(Mutex::new(VolumeManager::new(ctx)));
        let registry = Arc::new(ClientRegistry::new());

        let path = std::env::temp_dir().join(format!("droidvold-sock-{}", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path).unwrap();
        {
            let vm = vm.clone();
            let registry = registry.clone();
            thread::spawn(move || serve(listener, vm, registry));
        }

        let mut client = UnixStream::connect(&path).unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();

        write_frame(&mut client, "volume reset").unwrap();
        let reply = read_frame(&mut client).unwrap().unwrap();
        assert_eq!(reply, format!("{} Command succeeded", COMMAND_OKAY));

        // The registry now carries this client; 6xx frames reach it.
        registry.broadcast(DISK_CREATED, "disk:8,16 8");
        let event = read_frame(&mut client).unwrap().unwrap();
        assert_eq!(event, format!("{} disk:8,16 8", DISK_CREATED));

        let _ = std::fs::remove_file(&path);
    }
}
