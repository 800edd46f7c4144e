pub mod audio;
pub mod prompt;
pub mod session;
pub mod tools;
pub mod transcript;
pub mod turn_taking;
pub mod video;

// Re-export commonly used types for convenience
pub use session::{
    AudioChunk, CloseEvent, ImageFrame, LifecycleState, LiveClient, LiveVoice, SessionConfig,
    SessionError, SessionEvents, SessionResult, ToolInvocation, ToolResult, Transcription,
};

pub use audio::{
    AudioOutput, CaptureConfig, CapturePipeline, ChunkSink, MicrophoneSource, NullOutput,
    PlaybackConfig, PlaybackScheduler,
};

pub use prompt::PromptTemplate;
pub use tools::{DispatchOutcome, ToolDispatcher, ToolRegistry};
pub use transcript::{ConversationTurn, Role, TranscriptLog, TranscriptUpdate};
pub use turn_taking::{TurnAction, TurnSignal, TurnTakingPolicy, TurnTakingSupervisor};
pub use video::{FrameSource, StillImageSource};
