pub mod messages;

pub use messages::MessageService;
