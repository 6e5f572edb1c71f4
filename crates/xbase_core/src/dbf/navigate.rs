//! Record navigation in record-number order.

use super::{Nav, Scope, Table, TableStatus};
use crate::error::XbResult;

impl Table {
    /// Reads record `recno` into both buffers and makes it current.
    /// Pending edits are committed or discarded first.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRecord` for a number outside `1..=record_count`.
    pub fn get_record(&mut self, recno: u32) -> XbResult<()> {
        self.ensure_open()?;
        self.settle_pending()?;
        if recno > self.header.record_count {
            self.refresh_header()?;
        }
        self.check_recno(recno)?;
        let buf = self.read_record_at(recno)?;
        self.current.clone_from(&buf);
        self.original = buf;
        self.cur_rec = recno;
        self.status = TableStatus::Open;
        Ok(())
    }

    fn scan_forward(&mut self, from: u32, scope: Scope) -> XbResult<Nav> {
        let mut recno = from;
        while recno <= self.header.record_count {
            self.get_record(recno)?;
            if scope.admits(self.is_deleted()) {
                return Ok(Nav::Record(recno));
            }
            recno += 1;
        }
        Ok(Nav::Eof)
    }

    fn scan_backward(&mut self, from: u32, scope: Scope) -> XbResult<Nav> {
        let mut recno = from;
        while recno >= 1 {
            self.get_record(recno)?;
            if scope.admits(self.is_deleted()) {
                return Ok(Nav::Record(recno));
            }
            recno -= 1;
        }
        Ok(Nav::Bof)
    }

    fn start_walk(&mut self) -> XbResult<bool> {
        self.ensure_open()?;
        self.settle_pending()?;
        self.refresh_header()?;
        Ok(self.header.record_count > 0)
    }

    /// Moves to the first record in `scope`.
    ///
    /// # Errors
    ///
    /// Returns an error if a record cannot be read or pending edits cannot
    /// be committed.
    pub fn get_first_record(&mut self, scope: Scope) -> XbResult<Nav> {
        if !self.start_walk()? {
            return Ok(Nav::Empty);
        }
        self.scan_forward(1, scope)
    }

    /// Moves to the last record in `scope`.
    ///
    /// # Errors
    ///
    /// See [`Table::get_first_record`].
    pub fn get_last_record(&mut self, scope: Scope) -> XbResult<Nav> {
        if !self.start_walk()? {
            return Ok(Nav::Empty);
        }
        self.scan_backward(self.header.record_count, scope)
    }

    /// Moves to the next record in `scope` after the current one.
    ///
    /// # Errors
    ///
    /// See [`Table::get_first_record`].
    pub fn get_next_record(&mut self, scope: Scope) -> XbResult<Nav> {
        if !self.start_walk()? {
            return Ok(Nav::Empty);
        }
        if self.cur_rec >= self.header.record_count {
            return Ok(Nav::Eof);
        }
        self.scan_forward(self.cur_rec + 1, scope)
    }

    /// Moves to the previous record in `scope` before the current one.
    ///
    /// # Errors
    ///
    /// See [`Table::get_first_record`].
    pub fn get_prev_record(&mut self, scope: Scope) -> XbResult<Nav> {
        if !self.start_walk()? {
            return Ok(Nav::Empty);
        }
        if self.cur_rec <= 1 {
            return Ok(Nav::Bof);
        }
        self.scan_backward(self.cur_rec - 1, scope)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::dbf::{Nav, Scope, Table, TableVersion};
    use crate::error::{ErrorCode, XbError};
    use crate::schema::FieldSpec;
    use tempfile::{tempdir, TempDir};

    /// Five records, 2 and 4 deleted.
    fn table() -> (TempDir, Table) {
        let dir = tempdir().unwrap();
        let config = Config::default().single_user(true);
        let mut t = Table::create(
            &dir.path().join("T.DBF"),
            &[FieldSpec::numeric("N", 3, 0)],
            TableVersion::V3,
            false,
            config,
        )
        .unwrap();
        for n in 1..=5 {
            t.blank_record().unwrap();
            t.put_long("N", n).unwrap();
            t.append_record().unwrap();
            if n % 2 == 0 {
                t.delete_record().unwrap();
                t.commit().unwrap();
            }
        }
        (dir, t)
    }

    #[test]
    fn empty_table_reports_empty() {
        let dir = tempdir().unwrap();
        let mut t = Table::create(
            &dir.path().join("E.DBF"),
            &[FieldSpec::char("C", 1)],
            TableVersion::V3,
            false,
            Config::default().single_user(true),
        )
        .unwrap();
        assert_eq!(t.get_first_record(Scope::All).unwrap(), Nav::Empty);
        assert_eq!(t.get_next_record(Scope::All).unwrap(), Nav::Empty);
        assert_eq!(Nav::Empty.code(), ErrorCode::Empty);
    }

    #[test]
    fn scopes_filter_deleted_records() {
        let (_dir, mut t) = table();
        let mut active = Vec::new();
        let mut nav = t.get_first_record(Scope::ActiveOnly).unwrap();
        while let Nav::Record(n) = nav {
            active.push(n);
            nav = t.get_next_record(Scope::ActiveOnly).unwrap();
        }
        assert_eq!(active, vec![1, 3, 5]);
        assert_eq!(nav, Nav::Eof);

        assert_eq!(t.get_last_record(Scope::DeletedOnly).unwrap(), Nav::Record(4));
        assert_eq!(t.get_prev_record(Scope::DeletedOnly).unwrap(), Nav::Record(2));
        assert_eq!(t.get_prev_record(Scope::DeletedOnly).unwrap(), Nav::Bof);
    }

    #[test]
    fn get_record_checks_range() {
        let (_dir, mut t) = table();
        t.get_record(3).unwrap();
        assert_eq!(t.get_long("N").unwrap(), 3);
        assert!(matches!(t.get_record(0), Err(XbError::InvalidRecord { recno: 0, .. })));
        assert!(matches!(t.get_record(6), Err(XbError::InvalidRecord { count: 5, .. })));
    }

    #[test]
    fn navigation_commits_pending_edits() {
        let (_dir, mut t) = table();
        t.get_record(1).unwrap();
        t.put_long("N", 99).unwrap();
        t.get_next_record(Scope::All).unwrap();
        t.get_record(1).unwrap();
        assert_eq!(t.get_long("N").unwrap(), 99);
    }
}
