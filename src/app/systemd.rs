//! Minimal `sd_notify`-style readiness handshake (spec §6 `NOTIFY_SOCKET`).
//! Dependency-free: writes directly to the abstract/path Unix datagram
//! socket systemd provides, rather than pulling in a crate for a two-line
//! protocol.

use std::env;
use std::os::unix::net::UnixDatagram;

/// Sends `READY=1` to `$NOTIFY_SOCKET` if systemd set it. No-op (and not an
/// error) when the daemon wasn't started under systemd. Abstract-namespace
/// socket paths (a leading `@`) aren't supported by `std`'s `UnixDatagram`
/// and are skipped; path-based sockets, what systemd uses by default, work.
pub fn notify_ready() {
    let Ok(path) = env::var("NOTIFY_SOCKET") else { return };
    if path.is_empty() || path.starts_with('@') {
        return;
    }

    let Ok(socket) = UnixDatagram::unbound() else { return };
    let _ = socket.send_to(b"READY=1", path);
}
