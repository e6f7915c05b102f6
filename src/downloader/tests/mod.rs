use super::test_helpers::*;
use super::*;
use crate::error::{DownloadError, Error};
use crate::transcode::TranscodeAction;
use crate::types::{
    DownloadRequest, Event, InputMedia, JobPhase, MediaKind, PlaylistOptions, SourceFilter,
    TaskStage,
};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod notify;
