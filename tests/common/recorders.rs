//! In-memory status sink and delivery channel

use async_trait::async_trait;
use std::io::{Cursor, Read};
use std::sync::Mutex;
use stickerpack_dl::{DeliveryChannel, DeliveryError, StatusSink};

/// Keeps every status text in order
#[derive(Default)]
pub struct RecordingStatus {
    pub texts: Mutex<Vec<String>>,
}

impl RecordingStatus {
    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().expect("status lock").clone()
    }
}

#[async_trait]
impl StatusSink for RecordingStatus {
    async fn set_status(&self, text: &str) -> Result<(), DeliveryError> {
        self.texts.lock().expect("status lock").push(text.to_string());
        Ok(())
    }
}

/// One archive as received by the channel
#[derive(Clone, Debug)]
pub struct SentArchive {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub caption: String,
}

impl SentArchive {
    /// Read one archive entry
    pub fn entry(&self, name: &str) -> Vec<u8> {
        let mut zip = zip::ZipArchive::new(Cursor::new(&self.bytes[..])).expect("valid zip");
        let mut entry = zip.by_name(name).expect("entry present");
        let mut out = Vec::new();
        entry.read_to_end(&mut out).expect("read entry");
        out
    }

    /// Entry names in archive order
    pub fn entry_names(&self) -> Vec<String> {
        let mut zip = zip::ZipArchive::new(Cursor::new(&self.bytes[..])).expect("valid zip");
        (0..zip.len())
            .map(|i| zip.by_index(i).expect("entry present").name().to_string())
            .collect()
    }
}

/// Keeps every archive and notice
#[derive(Default)]
pub struct RecordingChannel {
    pub archives: Mutex<Vec<SentArchive>>,
    pub notices: Mutex<Vec<String>>,
}

impl RecordingChannel {
    pub fn archives(&self) -> Vec<SentArchive> {
        self.archives.lock().expect("channel lock").clone()
    }

    pub fn notices(&self) -> Vec<String> {
        self.notices.lock().expect("channel lock").clone()
    }
}

#[async_trait]
impl DeliveryChannel for RecordingChannel {
    async fn send_archive(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        caption: &str,
    ) -> Result<(), DeliveryError> {
        self.archives.lock().expect("channel lock").push(SentArchive {
            file_name: file_name.to_string(),
            bytes,
            caption: caption.to_string(),
        });
        Ok(())
    }

    async fn send_notice(&self, text: &str) -> Result<(), DeliveryError> {
        self.notices.lock().expect("channel lock").push(text.to_string());
        Ok(())
    }
}
