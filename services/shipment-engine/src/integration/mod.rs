pub mod chapa;
pub mod sms;

pub use chapa::ChapaClient;
pub use sms::SmsClient;
