// Copyright 2025 HEM Sp. z o.o.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::definitions::RouteCapability;

/// Capabilities of one receiver application family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverProfile {
    /// Stable name, also persisted to find the session to reconnect.
    pub id: &'static str,
    pub application_id: &'static str,
    pub mime_type: &'static str,
    /// Route capabilities a route must declare to host this receiver.
    pub selector: RouteCapability,
    /// File extensions this receiver is picked for. Empty means any media.
    pub extensions: &'static [&'static str],
}

impl ReceiverProfile {
    pub fn handles(&self, uri: &str) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        match uri_extension(uri) {
            Some(ext) => self.extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)),
            None => false,
        }
    }
}

pub const MEDIA_STREAMING: ReceiverProfile = ReceiverProfile {
    id: "media_streaming",
    application_id: "5A1BC0D9",
    mime_type: "application/x-mpegurl",
    selector: RouteCapability::RemotePlayback
        .union(RouteCapability::SessionControl)
        .union(RouteCapability::StatusQuery),
    extensions: &["m3u8", "mpd"],
};

pub const DEFAULT_MEDIA_RECEIVER: ReceiverProfile = ReceiverProfile {
    id: "default_media_receiver",
    application_id: "CC1AD845",
    mime_type: "video/mp4",
    selector: RouteCapability::RemotePlayback.union(RouteCapability::SessionControl),
    extensions: &[],
};

/// Profiles registered with the coordinator, most specific first.
pub const BUILTIN_PROFILES: &[ReceiverProfile] = &[MEDIA_STREAMING, DEFAULT_MEDIA_RECEIVER];

fn uri_extension(uri: &str) -> Option<String> {
    let path = uri.split(['?', '#']).next().unwrap_or(uri);
    let last_segment = path.rsplit('/').next()?;
    let (_, ext) = last_segment.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_string())
    }
}
