//! Bidirectional mirrored writes.
//!
//! Two rows that must agree (a link approval's mirrored person and inverse
//! edge, a connection and its reverse) are written as an idempotent keyed
//! upsert followed by a check-before-insert, each in its own transaction.
//! A crash between the two steps leaves a half-written pair that the next
//! run completes without duplicating anything.

use rusqlite::Connection;

use crate::error::GraphResult;

pub trait MirroredWrite {
    /// Row (or rows) the mirror hangs off
    type Anchor;

    /// Find or create the anchor. Returns the anchor and whether it was created.
    fn upsert_anchor(&self, conn: &Connection) -> GraphResult<(Self::Anchor, bool)>;

    /// Write whatever mirror rows are missing. Returns how many were written.
    fn ensure_mirror(&self, conn: &Connection, anchor: &Self::Anchor) -> GraphResult<usize>;
}

#[derive(Debug)]
pub struct MirrorReport<A> {
    pub anchor: A,
    pub anchor_created: bool,
    pub mirrored_rows: usize,
}

/// Run both steps, stopping at the first failure.
///
/// The anchor transaction is committed before the mirror step starts, so a
/// failed mirror leaves the anchor in place for the next attempt.
pub fn run_mirrored<W: MirroredWrite>(
    conn: &mut Connection,
    write: &W,
) -> GraphResult<MirrorReport<W::Anchor>> {
    let tx = conn.transaction()?;
    let (anchor, anchor_created) = write.upsert_anchor(&tx)?;
    tx.commit()?;

    let tx = conn.transaction()?;
    let mirrored_rows = write.ensure_mirror(&tx, &anchor)?;
    tx.commit()?;

    Ok(MirrorReport {
        anchor,
        anchor_created,
        mirrored_rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tables::connections;
    use crate::db::Db;
    use crate::error::GraphError;
    use family_graph_types::ConnectionKind;

    /// Writes `a → b`, then `b → a`, optionally failing the second step
    struct Pair {
        fail_mirror: bool,
    }

    impl MirroredWrite for Pair {
        type Anchor = ();

        fn upsert_anchor(&self, conn: &Connection) -> GraphResult<((), bool)> {
            let created = connections::insert_if_missing(conn, "a", "b", ConnectionKind::Friend)?;
            Ok(((), created))
        }

        fn ensure_mirror(&self, conn: &Connection, _anchor: &()) -> GraphResult<usize> {
            let written = connections::insert_if_missing(conn, "b", "a", ConnectionKind::Friend)?;
            if self.fail_mirror {
                return Err(GraphError::Internal("mirror step failed".to_string()));
            }
            Ok(written as usize)
        }
    }

    #[test]
    fn test_failed_mirror_keeps_anchor_and_rolls_back_mirror() {
        let db = Db::open(":memory:").unwrap();
        let mut conn = db.conn();

        assert!(run_mirrored(&mut conn, &Pair { fail_mirror: true }).is_err());
        assert!(connections::get_connection(&conn, "a", "b").unwrap().is_some());
        assert!(connections::get_connection(&conn, "b", "a").unwrap().is_none());

        let report = run_mirrored(&mut conn, &Pair { fail_mirror: false }).unwrap();
        assert!(!report.anchor_created);
        assert_eq!(report.mirrored_rows, 1);
    }

    #[test]
    fn test_rerun_converges() {
        let db = Db::open(":memory:").unwrap();
        let mut conn = db.conn();
        let first = run_mirrored(&mut conn, &Pair { fail_mirror: false }).unwrap();
        assert!(first.anchor_created);
        assert_eq!(first.mirrored_rows, 1);

        let second = run_mirrored(&mut conn, &Pair { fail_mirror: false }).unwrap();
        assert!(!second.anchor_created);
        assert_eq!(second.mirrored_rows, 0);
        assert_eq!(connections::list_for_user(&conn, "a").unwrap().len(), 1);
    }
}
