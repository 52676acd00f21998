//! 核心层：错误分类与处理、会话状态机、会话注册表、构建与生命周期

pub mod builder;
pub mod classifier;
pub mod error;
pub mod error_context;
pub mod error_handler;
pub mod session_registry;
pub mod shutdown;
pub mod state;
pub mod taxonomy;

pub use builder::{create_deps_from_config, create_llm_from_config, create_store_from_config};
pub use classifier::{classify_external_failure, classify_llm_failure, DEFAULT_SEARCH_PROVIDER};
pub use error::{AgentError, HandlerError};
pub use error_context::ErrorContext;
pub use error_handler::{ErrorHandler, ErrorResponse};
pub use session_registry::{resolve_session_id, AgentFactory, SessionRegistry};
pub use shutdown::{
    run_with_graceful_shutdown, ShutdownCleanup, ShutdownCoordinator, ShutdownManager,
    ShutdownReason, StoreCleanup,
};
pub use state::{SessionState, SessionStateMachine, StateInfo, StateTransitionRecord};
pub use taxonomy::{ApiError, ErrorKind, FailureCause};
