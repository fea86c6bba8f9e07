//! The three-way checksum decision table.
//!
//! Each attachment has up to three digests: the local file, the digest
//! recorded at the last reconciliation, and the canonical server digest.
//! Comparing them decides the direction of the next transfer without
//! moving any payload.

/// What to do with one attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Both sides hold the same content (or neither holds any).
    Skip,
    /// Pull the server payload.
    Download {
        /// Why, e.g. `missing` or `serverchange`; becomes the action tag
        /// `download-<reason>`.
        reason: &'static str,
    },
    /// Push the local payload.
    Upload {
        /// Why, e.g. `new` or `localchange`; becomes the action tag
        /// `upload-<reason>`.
        reason: &'static str,
    },
    /// Both sides changed since the last reconciliation; a resolver must
    /// pick the direction.
    Conflict,
}

/// Decides the direction for one attachment from its three digests.
///
/// The last-sync digest only matters when local and server both exist
/// and differ: matching the local digest means only the server moved,
/// matching the server digest means only the local file moved, matching
/// neither (or being absent) is a conflict.
pub fn decide(
    local: Option<&str>,
    last_sync: Option<&str>,
    server: Option<&str>,
) -> Decision {
    match (local, server) {
        (None, None) => Decision::Skip,
        (Some(l), Some(s)) if l == s => Decision::Skip,
        (None, Some(_)) => Decision::Download { reason: "missing" },
        (Some(_), None) => Decision::Upload { reason: "new" },
        (Some(l), Some(s)) => match last_sync {
            Some(sync) if sync == l => Decision::Download {
                reason: "serverchange",
            },
            Some(sync) if sync == s => Decision::Upload {
                reason: "localchange",
            },
            _ => Decision::Conflict,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Reference rendition of the table, written out row by row, checked
    // against `decide` over every combination of three distinct digests
    // and absence.
    fn reference(local: Option<&str>, last_sync: Option<&str>, server: Option<&str>) -> Decision {
        match (local, last_sync, server) {
            (None, _, None) => Decision::Skip,
            (Some(l), _, Some(s)) if l == s => Decision::Skip,
            (None, _, Some(_)) => Decision::Download { reason: "missing" },
            (Some(_), _, None) => Decision::Upload { reason: "new" },
            (Some(l), Some(sync), Some(_)) if sync == l => Decision::Download {
                reason: "serverchange",
            },
            (Some(_), Some(sync), Some(s)) if sync == s => Decision::Upload {
                reason: "localchange",
            },
            (Some(_), _, Some(_)) => Decision::Conflict,
        }
    }

    #[test]
    fn exhaustive_over_three_digests_and_absence() {
        let digests = [None, Some("a"), Some("b"), Some("c")];
        for local in digests {
            for last_sync in digests {
                for server in digests {
                    assert_eq!(
                        decide(local, last_sync, server),
                        reference(local, last_sync, server),
                        "local={local:?} last_sync={last_sync:?} server={server:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn canonical_rows() {
        // Fresh local file, never uploaded.
        assert_eq!(decide(Some("a"), None, None), Decision::Upload { reason: "new" });
        // Known on the server, nothing local yet.
        assert_eq!(
            decide(None, None, Some("a")),
            Decision::Download { reason: "missing" }
        );
        // Local edit only.
        assert_eq!(
            decide(Some("b"), Some("a"), Some("a")),
            Decision::Upload { reason: "localchange" }
        );
        // Server edit only.
        assert_eq!(
            decide(Some("a"), Some("a"), Some("b")),
            Decision::Download { reason: "serverchange" }
        );
        // Both moved.
        assert_eq!(decide(Some("b"), Some("a"), Some("c")), Decision::Conflict);
        // Both exist, differ, and nothing was ever reconciled.
        assert_eq!(decide(Some("a"), None, Some("b")), Decision::Conflict);
        // In sync.
        assert_eq!(decide(Some("a"), Some("a"), Some("a")), Decision::Skip);
    }
}
