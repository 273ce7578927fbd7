use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stages of a guest's booking journey, in chronological order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingStage {
    Inquiry,
    BookingConfirmed,
    PreArrival,
    CheckInDay,
    DuringStay,
    CheckOutDay,
    PostStay,
}

impl BookingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStage::Inquiry => "inquiry",
            BookingStage::BookingConfirmed => "booking_confirmed",
            BookingStage::PreArrival => "pre_arrival",
            BookingStage::CheckInDay => "check_in_day",
            BookingStage::DuringStay => "during_stay",
            BookingStage::CheckOutDay => "check_out_day",
            BookingStage::PostStay => "post_stay",
        }
    }
}

impl fmt::Display for BookingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Guest {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default = "default_num_guests")]
    pub num_guests: u32,
    #[serde(default)]
    pub check_in: Option<NaiveDate>,
    #[serde(default)]
    pub check_out: Option<NaiveDate>,
    #[serde(default = "default_platform")]
    pub platform: String,
    #[serde(default)]
    pub booking_id: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_num_guests() -> u32 {
    1
}

fn default_platform() -> String {
    "airbnb".to_string()
}

impl Guest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: None,
            phone: None,
            num_guests: default_num_guests(),
            check_in: None,
            check_out: None,
            platform: default_platform(),
            booking_id: None,
            notes: None,
        }
    }

    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or("")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Property {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub host_name: Option<String>,
    #[serde(default)]
    pub wifi_name: Option<String>,
    #[serde(default)]
    pub wifi_password: Option<String>,
    #[serde(default)]
    pub door_code: Option<String>,
    #[serde(default = "default_check_in_time")]
    pub check_in_time: String,
    #[serde(default = "default_check_out_time")]
    pub check_out_time: String,
    #[serde(default)]
    pub parking_info: Option<String>,
    #[serde(default)]
    pub house_rules: Option<String>,
    #[serde(default)]
    pub local_tips: Option<String>,
    #[serde(default)]
    pub emergency_contact: Option<String>,
}

fn default_check_in_time() -> String {
    "4:00 PM".to_string()
}

fn default_check_out_time() -> String {
    "11:00 AM".to_string()
}

impl Property {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            host_name: None,
            wifi_name: None,
            wifi_password: None,
            door_code: None,
            check_in_time: default_check_in_time(),
            check_out_time: default_check_out_time(),
            parking_info: None,
            house_rules: None,
            local_tips: None,
            emergency_contact: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertyList {
    #[serde(default)]
    pub properties: Vec<Property>,
}

/// A message template with `{variable}` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageTemplate {
    pub name: String,
    pub stage: BookingStage,
    #[serde(default)]
    pub subject: Option<String>,
    pub body: String,
    /// Hours relative to the stage anchor time.
    #[serde(default)]
    pub send_offset_hours: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateList {
    #[serde(default)]
    pub templates: Vec<MessageTemplate>,
}
