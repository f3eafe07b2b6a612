pub mod choices;
pub mod doctor;
pub mod patient;
pub mod record;
pub mod user;

pub use choices::{BloodType, Gender, Weekday};
pub use doctor::{Doctor, OpeningHours};
pub use patient::Patient;
pub use record::Record;
pub use user::CustomUser;
