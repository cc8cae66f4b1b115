use crate::engine::BatchEntries;
use crate::types::Value;

/// Batch state of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Empty,
    Queued,
    Executing,
}

/// Queued batch entries of one statement.
///
/// A plain statement queues SQL text and a prepared statement queues parameter rows; the
/// statement API makes sure only one of the two is ever used.
#[derive(Debug, Default)]
pub(crate) struct BatchQueue {
    sql: Vec<String>,
    rows: Vec<Vec<Value>>,
    executing: bool,
}

impl BatchQueue {
    pub(crate) fn state(&self) -> BatchState {
        if self.executing {
            BatchState::Executing
        } else if self.sql.is_empty() && self.rows.is_empty() {
            BatchState::Empty
        } else {
            BatchState::Queued
        }
    }

    pub(crate) fn push_sql(&mut self, sql: String) {
        self.sql.push(sql);
    }

    pub(crate) fn push_row(&mut self, row: Vec<Value>) {
        self.rows.push(row);
    }

    pub(crate) fn clear(&mut self) {
        self.sql.clear();
        self.rows.clear();
    }

    /// Move every entry out for execution. The queue is empty from here on, whatever the
    /// outcome of the batch.
    pub(crate) fn start(&mut self, prepared: Option<u64>) -> BatchEntries {
        self.executing = true;
        match prepared {
            Some(prepared) => BatchEntries::Bound {
                prepared,
                rows: std::mem::take(&mut self.rows),
            },
            None => BatchEntries::Sql(std::mem::take(&mut self.sql)),
        }
    }

    pub(crate) fn finish(&mut self) {
        self.executing = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_walks_empty_queued_executing_empty() {
        let mut queue = BatchQueue::default();
        assert_eq!(queue.state(), BatchState::Empty);

        queue.push_sql("INSERT INTO t VALUES (1)".into());
        queue.push_sql("INSERT INTO t VALUES (2)".into());
        assert_eq!(queue.state(), BatchState::Queued);

        let entries = queue.start(None);
        assert_eq!(entries.len(), 2);
        assert_eq!(queue.state(), BatchState::Executing);

        queue.finish();
        assert_eq!(queue.state(), BatchState::Empty);
    }

    #[test]
    fn bound_rows_keep_submission_order() {
        let mut queue = BatchQueue::default();
        queue.push_row(vec![Value::Integer(1)]);
        queue.push_row(vec![Value::Integer(2)]);
        match queue.start(Some(9)) {
            BatchEntries::Bound { prepared, rows } => {
                assert_eq!(prepared, 9);
                assert_eq!(rows, vec![vec![Value::Integer(1)], vec![Value::Integer(2)]]);
            }
            other => panic!("unexpected entries {other:?}"),
        }
    }

    #[test]
    fn clear_drops_everything_queued() {
        let mut queue = BatchQueue::default();
        queue.push_sql("DELETE FROM t".into());
        queue.clear();
        assert_eq!(queue.state(), BatchState::Empty);
        assert!(queue.start(None).is_empty());
    }
}
