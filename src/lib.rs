//! Gateway Interface (GI) engine for a PBX
//!
//! GI lets an external program drive a live call over a line protocol. The
//! program is either a local executable talking over its stdin/stdout, or a
//! network gateway reached with a `gi://host[:port][/script]` URL. The engine
//! sends a preamble describing the call, then reads one command per line,
//! dispatches it to a handler and writes a `200 result=...` reply, while
//! relaying voice frames to an optional audio side channel.
//!
//! # Architecture
//!
//! - [`Transport`] launches the program and owns its streams and process
//! - [`GiSession`] runs the loop between the [`Channel`] and the transport
//! - [`Registry`] maps verb words to [`CommandHandler`]s
//! - [`Services`] carries the key-value store, application registry and
//!   channel directory that handlers consume
//!
//! # Example
//!
//! ```rust,no_run
//! use pbx_gi_tokio::{launch_and_run, Channel, GiConfig, GiRequest, Registry, Services};
//!
//! async fn run_gi(channel: &mut dyn Channel) -> Result<(), pbx_gi_tokio::GiError> {
//!     let config = GiConfig::new().with_script_dir("/var/lib/pbx/gi-bin");
//!     let request = GiRequest::from_app_data("ivr.sh,welcome")?;
//!     let status = launch_and_run(
//!         channel,
//!         &request,
//!         &config,
//!         &Services::default(),
//!         Registry::global(),
//!     )
//!     .await?;
//!     println!("GI finished with status {}", status.code());
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod config;
pub mod error;
pub mod handlers;
pub mod preamble;
pub mod registry;
pub mod reply;
pub mod services;
pub mod session;
pub mod transport;

pub(crate) mod buffer;
pub(crate) mod constants;
pub(crate) mod parser;

pub use channel::{
    CallerId, Channel, ChannelError, ChannelInfo, ChannelResult, ChannelState, ControlPlayback,
    DigitsOutcome, Frame, Playback, PlaybackOutcome, RecordEnd, RecordOutcome, Recording,
    SayRequest, TddMode,
};
pub use config::GiConfig;
pub use constants::{DEFAULT_GI_PORT, KEEPALIVE_STATUS, MAX_ARGS, STATUS_VARIABLE};
pub use error::{GiError, GiResult};
pub use handlers::{Builtin, CommandContext, CommandHandler, SessionInfo};
pub use parser::parse_command;
pub use preamble::Preamble;
pub use registry::{CommandDescriptor, MatchMode, Registry};
pub use reply::{usage_block, HandlerResult, Reply};
pub use services::{
    AppOutcome, ApplicationRegistry, ChannelDirectory, ChannelGuard, ChannelTable, KeyValueStore,
    MemoryStore, NoApplications, Services, SharedChannel,
};
pub use session::{debug_enabled, launch_and_run, set_debug, GiSession, SessionState, SessionStatus};
pub use transport::{AudioSink, CommandReader, GiRequest, ProcessHandle, ProgramSpec, Transport};
