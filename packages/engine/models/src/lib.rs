#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Request and response types for the Earth Engine REST API (v1).
//!
//! The engine evaluates *expressions*: a flat table of value nodes keyed
//! by id, plus the id of the node that is the result. Function invocations
//! reference their arguments either inline (constants, arrays,
//! dictionaries) or through a `valueReference` into the table.
//!
//! See <https://developers.google.com/earth-engine/reference/rest>

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize, Serializer};
use strum_macros::{AsRefStr, Display, EnumString};

/// A serialized expression graph, ready to send to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    /// Value nodes keyed by id. Ids are referenced via
    /// [`ValueNode::ValueReference`].
    pub values: BTreeMap<String, ValueNode>,
    /// Id of the node whose value is the expression's result.
    pub result: String,
}

/// A single node in an [`Expression`].
///
/// Serializes as a one-of object, e.g. `{"constantValue": 3}` or
/// `{"functionInvocationValue": {"functionName": "...", "arguments": {...}}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueNode {
    /// Any JSON literal (number, string, bool, null, or plain object).
    ConstantValue(serde_json::Value),
    /// An ordered list of nodes.
    ArrayValue {
        /// Array elements.
        values: Vec<ValueNode>,
    },
    /// A string-keyed map of nodes.
    DictionaryValue {
        /// Dictionary entries.
        values: BTreeMap<String, ValueNode>,
    },
    /// A call to a named engine algorithm.
    FunctionInvocationValue {
        /// Algorithm name (e.g. `"Image.normalizedDifference"`).
        #[serde(rename = "functionName")]
        function_name: String,
        /// Named arguments.
        arguments: BTreeMap<String, ValueNode>,
    },
    /// Reference to another node in [`Expression::values`].
    ValueReference(String),
}

/// Body of `POST /v1/projects/{project}/value:compute`.
#[derive(Debug, Clone, Serialize)]
pub struct ComputeValueRequest<'a> {
    /// Expression to evaluate.
    pub expression: &'a Expression,
}

/// Response of `value:compute`.
#[derive(Debug, Clone, Deserialize)]
pub struct ComputeValueResponse {
    /// The evaluated value, as JSON.
    #[serde(default)]
    pub result: serde_json::Value,
}

/// Output file format of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FileFormat {
    /// Cloud-optimized `GeoTIFF` (rasters).
    GeoTiff,
    /// Comma-separated values (tables).
    Csv,
}

/// Google Drive export destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveDestination {
    /// Drive folder name (created if missing).
    pub folder: String,
    /// Output file name without extension.
    pub filename_prefix: String,
}

/// Cloud Storage export destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcsDestination {
    /// Bucket name.
    pub bucket: String,
    /// Object name prefix, including any folder path.
    pub filename_prefix: String,
}

/// Where and how an export writes its files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileExportOptions {
    /// Output file format.
    pub file_format: FileFormat,
    /// Drive destination (exclusive with `gcs_destination`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drive_destination: Option<DriveDestination>,
    /// Cloud Storage destination (exclusive with `drive_destination`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gcs_destination: Option<GcsDestination>,
}

/// Output pixel grid. Only the coordinate reference system is pinned;
/// scale and extent are carried by the exported expression itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PixelGrid {
    /// CRS code, e.g. `"EPSG:3395"`.
    pub crs_code: String,
}

/// Body of `POST /v1/projects/{project}/image:export`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportImageRequest {
    /// Image expression to export.
    pub expression: Expression,
    /// Human-readable task description (also used as the file name).
    pub description: String,
    /// Output options.
    pub file_export_options: FileExportOptions,
    /// Output grid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid: Option<PixelGrid>,
    /// Maximum number of pixels the export may produce.
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "int64_as_string"
    )]
    pub max_pixels: Option<u64>,
    /// Client-chosen id that makes repeated submissions idempotent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Body of `POST /v1/projects/{project}/table:export`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportTableRequest {
    /// `FeatureCollection` expression to export.
    pub expression: Expression,
    /// Human-readable task description (also used as the file name).
    pub description: String,
    /// Output options.
    pub file_export_options: FileExportOptions,
    /// Client-chosen id that makes repeated submissions idempotent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Long-running operation returned by export endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// Resource name, e.g. `projects/p/operations/ABC123`.
    pub name: String,
    /// Task metadata.
    #[serde(default)]
    pub metadata: Option<OperationMetadata>,
    /// Whether the operation has finished (successfully or not).
    #[serde(default)]
    pub done: bool,
    /// Failure status, present when `done` and the task failed.
    #[serde(default)]
    pub error: Option<Status>,
}

/// Metadata attached to an export [`Operation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationMetadata {
    /// Task state.
    #[serde(default)]
    pub state: OperationState,
    /// Task description as submitted.
    #[serde(default)]
    pub description: Option<String>,
    /// Creation timestamp (RFC 3339).
    #[serde(default)]
    pub create_time: Option<String>,
    /// Last update timestamp (RFC 3339).
    #[serde(default)]
    pub update_time: Option<String>,
    /// Progress in `[0, 1]`.
    #[serde(default)]
    pub progress: Option<f64>,
}

/// Lifecycle state of an export task.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationState {
    /// State not reported.
    #[default]
    StateUnspecified,
    /// Queued.
    Pending,
    /// Running.
    Running,
    /// Cancellation requested.
    Cancelling,
    /// Finished successfully.
    Succeeded,
    /// Cancelled.
    Cancelled,
    /// Failed.
    Failed,
}

/// Response of `GET /v1/projects/{project}/operations`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOperationsResponse {
    /// Operations on this page.
    #[serde(default)]
    pub operations: Vec<Operation>,
    /// Token for the next page, if any.
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Google RPC status (used for API errors and failed operations).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Numeric status code.
    #[serde(default)]
    pub code: i32,
    /// Developer-facing message.
    #[serde(default)]
    pub message: String,
    /// Canonical status name (e.g. `"INVALID_ARGUMENT"`).
    #[serde(default)]
    pub status: Option<String>,
}

/// Error body returned by the API on non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    /// The error status.
    pub error: Status,
}

/// The REST API encodes `int64` fields as decimal strings.
#[allow(clippy::ref_option)]
fn int64_as_string<S: Serializer>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) => serializer.serialize_str(&v.to_string()),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_nodes_serialize_as_one_of_objects() {
        let node = ValueNode::FunctionInvocationValue {
            function_name: "Image.load".to_string(),
            arguments: BTreeMap::from([(
                "id".to_string(),
                ValueNode::ConstantValue(serde_json::json!("LANDSAT/LC08/C02/T1")),
            )]),
        };

        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "functionInvocationValue": {
                    "functionName": "Image.load",
                    "arguments": { "id": { "constantValue": "LANDSAT/LC08/C02/T1" } }
                }
            })
        );

        let reference = serde_json::to_value(ValueNode::ValueReference("3".to_string())).unwrap();
        assert_eq!(reference, serde_json::json!({ "valueReference": "3" }));
    }

    #[test]
    fn max_pixels_is_sent_as_a_string() {
        let request = ExportImageRequest {
            expression: Expression {
                values: BTreeMap::new(),
                result: "0".to_string(),
            },
            description: "x".to_string(),
            file_export_options: FileExportOptions {
                file_format: FileFormat::GeoTiff,
                drive_destination: None,
                gcs_destination: None,
            },
            grid: None,
            max_pixels: Some(10_000_000_000),
            request_id: None,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["maxPixels"], serde_json::json!("10000000000"));
        assert_eq!(json["fileExportOptions"]["fileFormat"], "GEO_TIFF");
        assert!(json.get("grid").is_none());
    }

    #[test]
    fn parses_operation_with_metadata() {
        let op: Operation = serde_json::from_str(
            r#"{
                "name": "projects/p/operations/ABC",
                "metadata": {
                    "@type": "type.googleapis.com/google.earthengine.v1.OperationMetadata",
                    "state": "RUNNING",
                    "description": "CCA_NDVI_Accra_WGS84m_20230321"
                }
            }"#,
        )
        .unwrap();

        assert!(!op.done);
        let meta = op.metadata.unwrap();
        assert_eq!(meta.state, OperationState::Running);
        assert_eq!(
            meta.description.as_deref(),
            Some("CCA_NDVI_Accra_WGS84m_20230321")
        );
    }
}
