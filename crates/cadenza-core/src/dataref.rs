//! Named external buffers (DataRefs) with negotiated size and ownership.
//!
//! A patch creates its DataRefs empty and *requests* a size. The engine *commits* the
//! request with [`DataRef::allocate_if_needed`], or the host substitutes its own memory
//! with [`DataRef::set_data`]. Host memory (`dealloc == false`) is handed back to the host
//! when replaced; engine memory (`dealloc == true`) is simply dropped.

use serde::{Deserialize, Serialize};

use crate::warn_once;

/// Element type of a typed array DataRef.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Float32,
    Float64,
    Int32,
    UInt8,
}

impl ElementType {
    pub fn size_in_bytes(self) -> usize {
        match self {
            ElementType::Float32 | ElementType::Int32 => 4,
            ElementType::Float64 => 8,
            ElementType::UInt8 => 1,
        }
    }
}

/// Layout of a DataRef's bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum DataType {
    #[default]
    Untyped,
    TypedArray {
        element: ElementType,
    },
    /// Interleaved f32 samples.
    Float32AudioBuffer {
        channels: usize,
        sample_rate: f64,
    },
    /// Interleaved f64 samples.
    Float64AudioBuffer {
        channels: usize,
        sample_rate: f64,
    },
}

impl DataType {
    pub fn is_audio_buffer(&self) -> bool {
        matches!(
            self,
            DataType::Float32AudioBuffer { .. } | DataType::Float64AudioBuffer { .. }
        )
    }
}

/// Result of committing a size request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocationOutcome {
    /// No request pending, or it matched the current size without forcing.
    Unchanged,
    /// The committed size changed (or the buffer was zero-filled).
    Resized,
    /// Memory could not be provided; the previous size is kept and the request stays pending.
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct SizeRequest {
    bytes: usize,
    force: bool,
}

#[derive(Debug, Default)]
pub struct DataRef {
    name: String,
    file: Option<String>,
    tag: Option<String>,
    data_type: DataType,
    storage: Vec<u8>,
    size_in_bytes: usize,
    request: Option<SizeRequest>,
    dealloc: bool,
    touched: bool,
    wants_fill: bool,
}

impl DataRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dealloc: true,
            ..Self::default()
        }
    }

    pub fn with_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn set_data_type(&mut self, data_type: DataType) {
        self.data_type = data_type;
    }

    /// Committed size.
    pub fn size_in_bytes(&self) -> usize {
        self.size_in_bytes
    }

    /// Pending size request, if any.
    pub fn requested_size_in_bytes(&self) -> Option<usize> {
        self.request.map(|r| r.bytes)
    }

    /// Whether the engine owns the storage.
    pub fn dealloc(&self) -> bool {
        self.dealloc
    }

    pub fn touched(&self) -> bool {
        self.touched
    }

    pub fn set_touched(&mut self, touched: bool) {
        self.touched = touched;
    }

    /// Raised when a size request could not be satisfied and the host should supply memory.
    pub fn wants_fill(&self) -> bool {
        self.wants_fill
    }

    pub fn clear_wants_fill(&mut self) {
        self.wants_fill = false;
    }

    pub fn data(&self) -> &[u8] {
        &self.storage[..self.size_in_bytes]
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.storage[..self.size_in_bytes]
    }

    /// Record the size the patch wants. `force` zero-fills the whole buffer on commit.
    pub fn request_size_in_bytes(&mut self, bytes: usize, force: bool) {
        let force = force || self.request.is_some_and(|r| r.force);
        self.request = Some(SizeRequest { bytes, force });
    }

    /// Commit a pending size request.
    pub fn allocate_if_needed(&mut self) -> AllocationOutcome {
        let Some(request) = self.request else {
            return AllocationOutcome::Unchanged;
        };
        if request.bytes == self.size_in_bytes && !request.force {
            self.request = None;
            return AllocationOutcome::Unchanged;
        }

        if request.bytes > self.storage.len() {
            let grown = self.dealloc
                && self
                    .storage
                    .try_reserve_exact(request.bytes - self.storage.len())
                    .is_ok();
            if !grown {
                self.wants_fill = true;
                return AllocationOutcome::Failed;
            }
            self.storage.resize(request.bytes, 0);
        }

        if request.force {
            self.storage[..request.bytes].fill(0);
        } else if request.bytes > self.size_in_bytes {
            self.storage[self.size_in_bytes..request.bytes].fill(0);
        }
        self.size_in_bytes = request.bytes;
        self.request = None;
        self.wants_fill = false;
        AllocationOutcome::Resized
    }

    /// Substitute storage. The committed size becomes the buffer's length and any
    /// pending request is dropped. Returns the previous buffer if it belonged to the host.
    pub fn set_data(&mut self, data: Vec<u8>, dealloc: bool) -> Option<Vec<u8>> {
        let previous = std::mem::replace(&mut self.storage, data);
        let previous_host = !self.dealloc;
        self.size_in_bytes = self.storage.len();
        self.dealloc = dealloc;
        self.request = None;
        self.wants_fill = false;
        self.touched = true;
        previous_host.then_some(previous)
    }

    /// Remove host storage, leaving the DataRef empty and engine-owned.
    /// Returns `None` when the storage belongs to the engine.
    pub fn take_data(&mut self) -> Option<Vec<u8>> {
        if self.dealloc {
            return None;
        }
        self.size_in_bytes = 0;
        self.dealloc = true;
        self.touched = true;
        Some(std::mem::take(&mut self.storage))
    }

    pub fn audio_view(&self) -> Option<AudioBufferView<'_>> {
        let format = AudioFormat::from_type(self.data_type)?;
        Some(AudioBufferView {
            data: self.data(),
            format,
        })
    }

    pub fn audio_view_mut(&mut self) -> Option<AudioBufferViewMut<'_>> {
        let format = AudioFormat::from_type(self.data_type)?;
        Some(AudioBufferViewMut {
            data: self.data_mut(),
            format,
        })
    }
}

#[derive(Clone, Copy, Debug)]
struct AudioFormat {
    channels: usize,
    sample_rate: f64,
    wide: bool,
}

impl AudioFormat {
    fn from_type(data_type: DataType) -> Option<Self> {
        match data_type {
            DataType::Float32AudioBuffer {
                channels,
                sample_rate,
            } => Some(Self {
                channels,
                sample_rate,
                wide: false,
            }),
            DataType::Float64AudioBuffer {
                channels,
                sample_rate,
            } => Some(Self {
                channels,
                sample_rate,
                wide: true,
            }),
            _ => None,
        }
    }

    #[inline]
    fn sample_size(&self) -> usize {
        if self.wide {
            8
        } else {
            4
        }
    }

    fn frames(&self, bytes: usize) -> usize {
        if self.channels == 0 {
            0
        } else {
            bytes / (self.sample_size() * self.channels)
        }
    }

    fn offset(&self, bytes: usize, channel: usize, frame: usize) -> Option<usize> {
        if channel >= self.channels || frame >= self.frames(bytes) {
            return None;
        }
        Some((frame * self.channels + channel) * self.sample_size())
    }

    fn read(&self, data: &[u8], channel: usize, frame: usize) -> f64 {
        let Some(offset) = self.offset(data.len(), channel, frame) else {
            warn_once!(
                "Audio buffer read out of range: channel {}, frame {}",
                channel,
                frame
            );
            return 0.0;
        };
        if self.wide {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&data[offset..offset + 8]);
            f64::from_ne_bytes(raw)
        } else {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(&data[offset..offset + 4]);
            f32::from_ne_bytes(raw) as f64
        }
    }
}

/// Read-only interleaved view over an audio-buffer DataRef.
#[derive(Debug)]
pub struct AudioBufferView<'a> {
    data: &'a [u8],
    format: AudioFormat,
}

impl AudioBufferView<'_> {
    pub fn channels(&self) -> usize {
        self.format.channels
    }

    pub fn sample_rate(&self) -> f64 {
        self.format.sample_rate
    }

    pub fn frames(&self) -> usize {
        self.format.frames(self.data.len())
    }

    /// Sample at `(channel, frame)`, `0.0` when out of range.
    pub fn sample(&self, channel: usize, frame: usize) -> f64 {
        self.format.read(self.data, channel, frame)
    }
}

/// Mutable interleaved view over an audio-buffer DataRef.
#[derive(Debug)]
pub struct AudioBufferViewMut<'a> {
    data: &'a mut [u8],
    format: AudioFormat,
}

impl AudioBufferViewMut<'_> {
    pub fn channels(&self) -> usize {
        self.format.channels
    }

    pub fn sample_rate(&self) -> f64 {
        self.format.sample_rate
    }

    pub fn frames(&self) -> usize {
        self.format.frames(self.data.len())
    }

    pub fn sample(&self, channel: usize, frame: usize) -> f64 {
        self.format.read(self.data, channel, frame)
    }

    /// Write a sample. Returns `false` when out of range.
    pub fn set_sample(&mut self, channel: usize, frame: usize, value: f64) -> bool {
        let Some(offset) = self.format.offset(self.data.len(), channel, frame) else {
            warn_once!(
                "Audio buffer write out of range: channel {}, frame {}",
                channel,
                frame
            );
            return false;
        };
        if self.format.wide {
            self.data[offset..offset + 8].copy_from_slice(&value.to_ne_bytes());
        } else {
            self.data[offset..offset + 4].copy_from_slice(&(value as f32).to_ne_bytes());
        }
        true
    }
}
