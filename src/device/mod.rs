pub mod flow;
pub mod poller;
pub mod session;

pub use flow::{DeviceFlow, DeviceLogin, FlowState, SignOutReport, UserInfoOutcome};
pub use poller::{PollCanceller, PollObserver, PollProgress, PollStatus, PollTask};
pub use session::DeviceAuthorizationSession;
