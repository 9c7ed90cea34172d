use std::sync::Arc;

use serde::Serialize;

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A file added to every message of a campaign.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    filename: String,
    content_type: String,
    content: Arc<[u8]>,
}

impl Attachment {
    /// Keeps only the last path component of `filename`.
    pub fn parse(
        filename: &str,
        content_type: Option<&str>,
        content: Vec<u8>,
    ) -> Result<Attachment, String> {
        let filename = filename
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default()
            .trim();
        if filename.is_empty() || filename == "." || filename == ".." {
            return Err("No selected file".into());
        }
        if filename.chars().any(|c| c.is_control() || c == '"') {
            return Err(format!("{} is not a valid file name.", filename));
        }
        let content_type = content_type
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE);
        Ok(Self {
            filename: filename.to_owned(),
            content_type: content_type.to_owned(),
            content: Arc::from(content),
        })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn size(&self) -> usize {
        self.content.len()
    }

    pub fn summary(&self) -> AttachmentSummary {
        AttachmentSummary {
            filename: self.filename.clone(),
            size: self.size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttachmentSummary {
    pub filename: String,
    pub size: usize,
}

/// Uploaded attachments in upload order, unique by file name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttachmentSet(Vec<Attachment>);

impl AttachmentSet {
    /// Adds `attachment`, replacing any file with the same name.
    pub fn upsert(&mut self, attachment: Attachment) {
        match self.0.iter_mut().find(|a| a.filename == attachment.filename) {
            Some(existing) => *existing = attachment,
            None => self.0.push(attachment),
        }
    }

    pub fn remove(&mut self, filename: &str) -> Option<Attachment> {
        let index = self.0.iter().position(|a| a.filename == filename)?;
        Some(self.0.remove(index))
    }

    pub fn to_vec(&self) -> Vec<Attachment> {
        self.0.clone()
    }

    pub fn summaries(&self) -> Vec<AttachmentSummary> {
        self.0.iter().map(Attachment::summary).collect()
    }
}
