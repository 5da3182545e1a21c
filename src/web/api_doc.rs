use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};

use super::api::channels::{IngestResponse, IngestStatus};
use super::api::error::ErrorResponse;
use super::api::tracks::LoadTrackResponse;
use crate::reconciler::{ChannelStatus, PlaybackFrame, RenderEvent, TrackSummary};
use crate::sample::{FieldOrder, PositionSample};

#[derive(OpenApi)]
#[openapi(
    paths(
        super::api::channels::publish_position,
        super::api::channels::list_channels,
        super::api::channels::get_channel,
        super::api::tracks::load_track,
        super::api::tracks::get_track,
        super::api::tracks::get_sample,
        super::api::tracks::scrub,
        super::api::tracks::interpolate,
        super::api::stream::stream_events,
    ),
    components(
        schemas(
            IngestResponse,
            IngestStatus,
            LoadTrackResponse,
            ErrorResponse,
            ChannelStatus,
            TrackSummary,
            PlaybackFrame,
            PositionSample,
            FieldOrder,
            RenderEvent,
        )
    ),
    modifiers(&SecurityAddon),
    info(
        title = "Track-O-Mat API",
        description = "Live channel positions and track playback",
        version = "0.1.0"
    ),
    tags(
        (name = "channels", description = "Live channel state"),
        (name = "tracks", description = "Historical tracks and playback"),
        (name = "stream", description = "Render event stream")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}
