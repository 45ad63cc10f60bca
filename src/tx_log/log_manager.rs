use std::{
    convert::TryFrom,
    io::Cursor,
    path::{Path, PathBuf},
};

use log::debug;

use crate::{
    error::SmallError,
    io::{read_into, Decodeable, Encodeable, SmallFile, SmallWriter},
    transaction::{Transaction, TransactionID},
    types::SmallResult,
};

/// # Format
///
/// - 1 byte: record type
/// - 4 bytes: transaction id
const RECORD_LEN: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    Start,
    Commit,
    Abort,
}

impl RecordType {
    fn to_byte(self) -> u8 {
        match self {
            RecordType::Start => 0,
            RecordType::Commit => 1,
            RecordType::Abort => 2,
        }
    }
}

impl TryFrom<u8> for RecordType {
    type Error = SmallError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RecordType::Start),
            1 => Ok(RecordType::Commit),
            2 => Ok(RecordType::Abort),
            _ => Err(SmallError::inconsistency(&format!(
                "invalid record type: {}",
                value
            ))),
        }
    }
}

impl Encodeable for RecordType {
    fn encode(&self, writer: &mut SmallWriter) {
        writer.write(&self.to_byte());
    }
}

impl Decodeable for RecordType {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> Result<Self, SmallError> {
        RecordType::try_from(u8::decode_from(reader)?)
    }
}

/// Append-only transaction log.
///
/// Pages are never written back before their transaction commits, so
/// the table files only hold committed data and an abort needs no
/// physical undo. The log only keeps the outcome of each transaction.
pub struct LogManager {
    file: SmallFile,
    file_path: PathBuf,

    /// The absolute position where the next record goes.
    current_offset: u64,

    total_records: usize,
}

impl LogManager {
    /// Open the log at `file_path`. Recovery is not supported, the
    /// previous content of the file is dropped.
    pub fn new<P: AsRef<Path>>(file_path: P) -> Result<Self, SmallError> {
        let file = SmallFile::new(&file_path)?;
        file.set_len(0)?;
        Ok(Self {
            file,
            file_path: file_path.as_ref().to_path_buf(),
            current_offset: 0,
            total_records: 0,
        })
    }

    pub fn reset(&mut self) -> SmallResult {
        self.file = SmallFile::new(&self.file_path)?;
        self.file.set_len(0)?;
        self.current_offset = 0;
        self.total_records = 0;
        Ok(())
    }

    pub fn records_count(&self) -> usize {
        self.total_records
    }

    pub fn log_start(&mut self, tx: &Transaction) -> SmallResult {
        self.append(RecordType::Start, tx)
    }

    pub fn log_commit(&mut self, tx: &Transaction) -> SmallResult {
        self.append(RecordType::Commit, tx)
    }

    pub fn log_abort(&mut self, tx: &Transaction) -> SmallResult {
        self.append(RecordType::Abort, tx)
    }

    fn append(&mut self, record_type: RecordType, tx: &Transaction) -> SmallResult {
        let mut writer = SmallWriter::new_reserved(RECORD_LEN as usize);
        writer.write(&record_type);
        writer.write(&tx.get_id());

        self.file.write_at(self.current_offset, &writer.to_bytes())?;
        self.file.flush()?;

        self.current_offset += RECORD_LEN;
        self.total_records += 1;
        Ok(())
    }

    /// Decode all records, in the order they were written.
    pub fn get_records(&mut self) -> Result<Vec<(RecordType, TransactionID)>, SmallError> {
        let bytes = self.file.read_at(0, self.current_offset as usize)?;
        let mut reader = Cursor::new(bytes);

        let mut records = Vec::with_capacity(self.total_records);
        for _ in 0..self.total_records {
            let record_type: RecordType = read_into(&mut reader)?;
            let tid: TransactionID = read_into(&mut reader)?;
            records.push((record_type, tid));
        }
        Ok(records)
    }

    pub fn show_log_contents(&mut self) -> SmallResult {
        let mut depiction = String::new();
        for (i, (record_type, tid)) in self.get_records()?.iter().enumerate() {
            depiction.push_str(&format!("├── [record {}]-{:?}\n", i, record_type));
            depiction.push_str(&format!("│   └── [4 bytes] tid: {}\n", tid));
        }

        debug!("log content: \n{}", depiction);
        Ok(())
    }
}
