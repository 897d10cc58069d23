use std::fmt;

use importer_logging::importer_debug;

use crate::{ImporterError, PreviewData, PreviewRow};

/// Upload size accepted before any request is made.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

const ALLOWED_EXTENSIONS: &[&str] = &["xlsx", "xls"];

/// Sequence number identifying one upload attempt.
pub type UploadSeq = u64;

/// Opaque reference to parsed, not-yet-committed spreadsheet data.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreviewHandle(String);

impl PreviewHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PreviewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A file chosen by the operator.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

// Spreadsheet bytes are noise in logs and test failure output.
impl fmt::Debug for UploadFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadFile")
            .field("name", &self.name)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// Successful parse result reported back by the upload collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedPreview {
    pub handle: PreviewHandle,
    pub columns: Vec<String>,
    pub rows: Vec<PreviewRow>,
    pub total_rows: usize,
}

/// Case-insensitive `.xlsx` / `.xls` check on the final path component.
pub fn has_allowed_extension(name: &str) -> bool {
    let file_name = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(name);
    match file_name.rsplit_once('.') {
        Some((_, ext)) => ALLOWED_EXTENSIONS
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ext)),
        None => false,
    }
}

/// Local checks run before a file is sent anywhere.
pub fn validate_upload(name: &str, size: u64, max_bytes: u64) -> Result<(), ImporterError> {
    if !has_allowed_extension(name) {
        return Err(ImporterError::InvalidFileType {
            name: name.to_string(),
        });
    }
    if size == 0 {
        return Err(ImporterError::EmptyFile);
    }
    if size > max_bytes {
        return Err(ImporterError::FileTooLarge {
            size,
            max: max_bytes,
        });
    }
    Ok(())
}

/// Upload bookkeeping: the in-flight attempt and the accepted preview.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct UploadSession {
    last_seq: UploadSeq,
    in_flight: Option<UploadSeq>,
    preview: Option<(PreviewHandle, PreviewData)>,
}

impl UploadSession {
    /// Starts a new attempt, dropping any previous preview.
    pub(crate) fn begin(&mut self) -> UploadSeq {
        self.last_seq += 1;
        self.in_flight = Some(self.last_seq);
        self.preview = None;
        self.last_seq
    }

    /// Clears the in-flight marker if `seq` is the current attempt.
    pub(crate) fn finish(&mut self, seq: UploadSeq) -> bool {
        if self.in_flight == Some(seq) {
            self.in_flight = None;
            true
        } else {
            importer_debug!("ignoring response for superseded upload #{}", seq);
            false
        }
    }

    pub(crate) fn accept(&mut self, uploaded: UploadedPreview) {
        let data = PreviewData::new(uploaded.columns, uploaded.rows, uploaded.total_rows);
        self.preview = Some((uploaded.handle, data));
    }

    pub(crate) fn reset(&mut self) {
        self.in_flight = None;
        self.preview = None;
    }

    pub(crate) fn handle(&self) -> Option<&PreviewHandle> {
        self.preview.as_ref().map(|(handle, _)| handle)
    }

    pub(crate) fn preview(&self) -> Option<&PreviewData> {
        self.preview.as_ref().map(|(_, data)| data)
    }

    pub(crate) fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_check_is_case_insensitive() {
        assert!(has_allowed_extension("issues.xlsx"));
        assert!(has_allowed_extension("ISSUES.XLS"));
        assert!(has_allowed_extension("dir/Sub.Dir/issues.XlSx"));
        assert!(!has_allowed_extension("issues.csv"));
        assert!(!has_allowed_extension("issues.xlsx.txt"));
        assert!(!has_allowed_extension("xlsx"));
        assert!(!has_allowed_extension("archive.xlsx/notes"));
    }

    #[test]
    fn validation_order_and_limits() {
        assert_eq!(
            validate_upload("notes.txt", 0, 10),
            Err(ImporterError::InvalidFileType {
                name: "notes.txt".into()
            })
        );
        assert_eq!(validate_upload("a.xlsx", 0, 10), Err(ImporterError::EmptyFile));
        assert_eq!(
            validate_upload("a.xlsx", 11, 10),
            Err(ImporterError::FileTooLarge { size: 11, max: 10 })
        );
        assert_eq!(validate_upload("a.xlsx", 10, 10), Ok(()));
    }

    #[test]
    fn superseded_attempts_are_rejected() {
        let mut session = UploadSession::default();
        let first = session.begin();
        let second = session.begin();
        assert!(!session.finish(first));
        assert!(session.finish(second));
        assert!(!session.finish(second));
    }

    #[test]
    fn debug_output_omits_file_bytes() {
        let file = UploadFile::new("a.xlsx", vec![1, 2, 3]);
        assert_eq!(format!("{file:?}"), "UploadFile { name: \"a.xlsx\", size: 3 }");
    }
}
