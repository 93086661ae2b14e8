//! Multi-homed address bookkeeping.
//!
//! The tracker owns the association's [`AddressSnapshot`]. A refresh gathers
//! every piece (local primary, local set, remote primary, remote set, per-path
//! metrics) into a candidate and only then replaces the exposed snapshot, so
//! readers never observe a mix of old and new values. If any piece fails, or
//! a primary address is missing from its own set, the candidate is discarded
//! and the previous snapshot stays in place.

use crate::association::status::PathInfo;
use crate::sys::SctpSys;

use log::debug;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::os::fd::RawFd;

/// Point-in-time view of an association's addresses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressSnapshot {
    pub local_primary: SocketAddr,
    pub local: Vec<SocketAddr>,
    /// `None` only for sockets that have no peer at all.
    pub remote_primary: Option<SocketAddr>,
    pub remote: Option<Vec<SocketAddr>>,
    /// One entry per remote address; empty until the association is
    /// established.
    pub paths: Vec<PathInfo>,
}

impl AddressSnapshot {
    /// The snapshot an association starts with, before any gather.
    pub fn initial(local_primary: SocketAddr, remote_primary: Option<SocketAddr>) -> Self {
        Self {
            local_primary,
            local: vec![local_primary],
            remote_primary,
            remote: remote_primary.map(|address| vec![address]),
            paths: Vec::new(),
        }
    }

    /// `true` when the primaries or the set membership differ. Address order
    /// and path metrics are not compared.
    pub fn addresses_differ(&self, other: &AddressSnapshot) -> bool {
        self.local_primary != other.local_primary
            || self.remote_primary != other.remote_primary
            || !same_members(&self.local, &other.local)
            || !same_members(
                self.remote.as_deref().unwrap_or_default(),
                other.remote.as_deref().unwrap_or_default(),
            )
            || self.remote.is_some() != other.remote.is_some()
    }
}

fn same_members(left: &[SocketAddr], right: &[SocketAddr]) -> bool {
    let left: HashSet<&SocketAddr> = left.iter().collect();
    let right: HashSet<&SocketAddr> = right.iter().collect();

    left == right
}

pub(crate) struct AddressTracker {
    snapshot: AddressSnapshot,
    gathered: bool,
}

impl AddressTracker {
    pub(crate) fn new(initial: AddressSnapshot) -> Self {
        Self {
            snapshot: initial,
            gathered: false,
        }
    }

    pub(crate) fn snapshot(&self) -> &AddressSnapshot {
        &self.snapshot
    }

    /// `true` once at least one refresh ran.
    pub(crate) fn is_gathered(&self) -> bool {
        self.gathered
    }

    /// Re-gathers all addresses and path metrics.
    ///
    /// # Arguments
    /// * `connected` - Remote addresses and paths are only queried once the
    ///   association is established; before that the previous remote part is
    ///   carried over
    ///
    /// # Returns
    /// The new snapshot when a primary address or set membership changed.
    pub(crate) fn refresh(
        &mut self,
        sys: &dyn SctpSys,
        fd: RawFd,
        connected: bool,
    ) -> Option<AddressSnapshot> {
        self.gathered = true;

        let candidate = gather(sys, fd, connected, &self.snapshot)?;
        let changed = candidate.addresses_differ(&self.snapshot);
        self.snapshot = candidate;

        changed.then(|| self.snapshot.clone())
    }
}

/// Builds a complete candidate snapshot, or `None` if it must not replace
/// `previous`.
pub(crate) fn gather(
    sys: &dyn SctpSys,
    fd: RawFd,
    connected: bool,
    previous: &AddressSnapshot,
) -> Option<AddressSnapshot> {
    let local_primary = sys
        .local_name(fd)
        .inspect_err(|errno| debug!("fd {fd}: getsockname failed: {errno}"))
        .ok()?;
    let local = sys
        .local_addresses(fd)
        .inspect_err(|errno| debug!("fd {fd}: local address gather failed: {errno}"))
        .ok()?;

    // a wildcard-bound socket reports the unspecified address as primary
    if !local_primary.ip().is_unspecified() && !local.contains(&local_primary) {
        debug!("fd {fd}: local primary {local_primary} not among local addresses, keeping snapshot");
        return None;
    }

    if !connected {
        return Some(AddressSnapshot {
            local_primary,
            local,
            remote_primary: previous.remote_primary,
            remote: previous.remote.clone(),
            paths: Vec::new(),
        });
    }

    let remote_primary = sys
        .peer_name(fd)
        .inspect_err(|errno| debug!("fd {fd}: getpeername failed: {errno}"))
        .ok()?;
    let remote = sys
        .peer_addresses(fd)
        .inspect_err(|errno| debug!("fd {fd}: peer address gather failed: {errno}"))
        .ok()?;

    if !remote.contains(&remote_primary) {
        debug!("fd {fd}: remote primary {remote_primary} not among peer addresses, keeping snapshot");
        return None;
    }

    let paths = remote
        .iter()
        .map(|address| sys.peer_path_info(fd, *address))
        .collect::<Result<Vec<_>, _>>()
        .inspect_err(|errno| debug!("fd {fd}: path info gather failed: {errno}"))
        .ok()?;

    Some(AddressSnapshot {
        local_primary,
        local,
        remote_primary: Some(remote_primary),
        remote: Some(remote),
        paths,
    })
}
