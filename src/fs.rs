//! Filesystem timestamp queries, the staleness signal for rebuilds.

use std::os::unix::prelude::MetadataExt;

/// MTime info gathered for a file.  This also models "file is absent".
/// It's not using an Option<> just because it makes the code using it easier
/// to follow.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MTime {
    Missing,
    /// Nanoseconds since the epoch.
    Stamp(u64),
}

/// stat() an on-disk path, producing its MTime.
pub fn stat(path: &str) -> std::io::Result<MTime> {
    Ok(match std::fs::metadata(path) {
        Ok(meta) => MTime::Stamp(meta.mtime() as u64 * 1_000_000_000 + meta.mtime_nsec() as u64),
        Err(err) => {
            if err.kind() == std::io::ErrorKind::NotFound {
                MTime::Missing
            } else {
                return Err(err);
            }
        }
    })
}

/// Opaque token for a file's last observed state, compared to learn whether
/// one observation differs from another.  Never compared against the clock.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Fingerprint(u64);

impl Fingerprint {
    /// The value recorded for a file or dependency that has never been
    /// observed.  A missing file fingerprints to this same value.
    pub const UNOBSERVED: Fingerprint = Fingerprint(0);
}

impl From<MTime> for Fingerprint {
    fn from(mtime: MTime) -> Fingerprint {
        // Stamps are offset by one so an existing file never collides with
        // the unobserved value, even at mtime zero.
        match mtime {
            MTime::Missing => Fingerprint(0),
            MTime::Stamp(t) => Fingerprint(t + 1),
        }
    }
}
