// Library root
// -----------
// Shared code for the two command-line tools in this crate:
// `create-multiview-tasks` (batch) and `create-sample-task` (single sample).
//
// Module responsibilities:
// - `config`: immutable run configuration and the built-in defaults.
// - `sessions`: parses `--sessions` tokens ("01", "00-10") into a set of ids.
// - `discovery`: finds complete view sets on disk and names their tasks.
// - `api`: blocking HTTP client for login and multiview task creation.
// - `token`: API token lookup/persistence used by the sample tool.
// - `logging`: tracing subscriber setup honoring `RUST_LOG`.
// - `batch`: drives discovery -> plan -> upload loop -> summary.
// - `error`: typed errors for each of the layers above.
pub mod api;
pub mod batch;
pub mod config;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod sessions;
pub mod token;
