use utoipa::OpenApi;

use crate::modules::content::dto::VideoResponse;
use crate::modules::content::model::AssetStatus;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::modules::content::handler::list_videos,
        crate::modules::content::stream_handler::get_manifest,
        crate::modules::content::stream_handler::get_segment,
        crate::modules::content::stream_handler::get_thumbnail,
    ),
    components(
        schemas(VideoResponse, AssetStatus)
    ),
    tags(
        (name = "Content", description = "Video catalogue"),
        (name = "Streaming", description = "HLS manifests, segments and thumbnails")
    )
)]
pub struct ApiDoc;
