use std::path::{Path, PathBuf};

/// `UPLOAD_ERR_OK`.
pub const UPLOAD_ERR_OK: u8 = 0;
/// `UPLOAD_ERR_NO_FILE`.
pub const UPLOAD_ERR_NO_FILE: u8 = 4;

/// One uploaded file as handed over by the runtime.
///
/// The runtime already wrote the temp file outside the interpreter's upload
/// handler, so consumers must not run an "uploaded via HTTP POST" check on
/// `temp_path`. [`UploadedFile::skips_upload_check`] reports that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    field: String,
    filename: String,
    content_type: String,
    temp_path: PathBuf,
    size: u64,
    error: u8,
    skip_upload_check: bool,
}

impl UploadedFile {
    pub fn from_runtime(
        field: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        temp_path: impl Into<PathBuf>,
        size: u64,
        error: u8,
    ) -> Self {
        Self {
            field: field.into(),
            filename: filename.into(),
            content_type: content_type.into(),
            temp_path: temp_path.into(),
            size,
            error,
            skip_upload_check: true,
        }
    }

    /// Form field path, e.g. `avatar` or `docs[0]`.
    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn error(&self) -> u8 {
        self.error
    }

    pub fn is_ok(&self) -> bool {
        self.error == UPLOAD_ERR_OK
    }

    pub fn skips_upload_check(&self) -> bool {
        self.skip_upload_check
    }
}

/// A single file, or an ordered group of named children (`docs[0]`,
/// `docs[1]`, `gallery[cover]`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileNode {
    File(UploadedFile),
    Nested(Vec<(String, FileNode)>),
}

impl FileNode {
    pub fn as_file(&self) -> Option<&UploadedFile> {
        match self {
            FileNode::File(file) => Some(file),
            FileNode::Nested(_) => None,
        }
    }

    pub fn child(&self, name: &str) -> Option<&FileNode> {
        match self {
            FileNode::File(_) => None,
            FileNode::Nested(children) => children
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, node)| node),
        }
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a UploadedFile>) {
        match self {
            FileNode::File(file) => out.push(file),
            FileNode::Nested(children) => {
                for (_, node) in children {
                    node.collect(out);
                }
            }
        }
    }
}

/// Top-level uploaded-file fields of one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileTree {
    fields: Vec<(String, FileNode)>,
}

impl FileTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, node: FileNode) {
        self.fields.push((field.into(), node));
    }

    pub fn get(&self, field: &str) -> Option<&FileNode> {
        self.fields
            .iter()
            .find(|(n, _)| n == field)
            .map(|(_, node)| node)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, FileNode)> {
        self.fields.iter()
    }

    /// Every file in depth-first field order.
    pub fn files(&self) -> Vec<&UploadedFile> {
        let mut out = Vec::new();
        for (_, node) in &self.fields {
            node.collect(&mut out);
        }
        out
    }
}
