use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info};

use super::defaults::default_templates;
use super::{Context, render};
use crate::models::{BookingStage, Guest, MessageTemplate, Property, PropertyList, TemplateList};
use crate::utils::fs::{load_document, write_json};
use crate::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratedMessage {
    pub subject: Option<String>,
    pub body: String,
    pub template_name: String,
    pub stage: BookingStage,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledMessage {
    pub send_at: NaiveDateTime,
    #[serde(flatten)]
    pub message: GeneratedMessage,
}

/// Personalised guest messages from per-stage templates.
#[derive(Debug, Default)]
pub struct GuestMessenger {
    properties: HashMap<String, Property>,
    templates: BTreeMap<BookingStage, Vec<MessageTemplate>>,
}

impl GuestMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_templates() -> Self {
        let mut messenger = Self::new();
        for template in default_templates() {
            messenger.add_template(template);
        }
        messenger
    }

    pub fn add_property(&mut self, property: Property) {
        self.properties.insert(property.name.clone(), property);
    }

    pub fn add_properties_from_file(&mut self, path: &Path) -> Result<usize> {
        let list: PropertyList = load_document(path)?;
        let count = list.properties.len();
        for property in list.properties {
            self.add_property(property);
        }
        Ok(count)
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    pub fn add_template(&mut self, template: MessageTemplate) {
        self.templates.entry(template.stage).or_default().push(template);
    }

    pub fn add_templates_from_file(&mut self, path: &Path) -> Result<usize> {
        let list: TemplateList = load_document(path)?;
        let count = list.templates.len();
        for template in list.templates {
            self.add_template(template);
        }
        info!(path = %path.display(), count, "Loaded message templates");
        Ok(count)
    }

    /// All templates in stage order.
    pub fn templates(&self) -> impl Iterator<Item = &MessageTemplate> {
        self.templates.values().flatten()
    }

    pub fn export_templates(&self, path: &Path) -> Result<()> {
        let list = TemplateList {
            templates: self.templates().cloned().collect(),
        };
        write_json(path, &list)
    }

    /// Renders a template for `stage`: the named one, or the first registered.
    pub fn generate_message(
        &self,
        guest: &Guest,
        property_name: &str,
        stage: BookingStage,
        template_name: Option<&str>,
    ) -> Result<GeneratedMessage> {
        let property = self
            .properties
            .get(property_name)
            .ok_or_else(|| AppError::not_found(format!("Property '{}'", property_name)))?;

        let stage_templates = self
            .templates
            .get(&stage)
            .filter(|templates| !templates.is_empty())
            .ok_or_else(|| AppError::Validation(format!("No templates for stage: {}", stage)))?;

        let template = match template_name {
            Some(name) => stage_templates
                .iter()
                .find(|t| t.name == name)
                .ok_or_else(|| AppError::not_found(format!("Template '{}'", name)))?,
            None => &stage_templates[0],
        };

        let variables = build_variables(guest, property);
        Ok(GeneratedMessage {
            subject: template.subject.as_deref().map(|s| render(s, &variables)),
            body: render(&template.body, &variables),
            template_name: template.name.clone(),
            stage,
        })
    }

    /// Every template scheduled against the guest's stay, earliest first.
    pub fn get_scheduled_messages(
        &self,
        guest: &Guest,
        property_name: &str,
        now: NaiveDateTime,
    ) -> Result<Vec<ScheduledMessage>> {
        let check_in = guest
            .check_in
            .ok_or_else(|| AppError::Validation("Guest check_in date required".to_string()))?;

        let mut messages = Vec::new();
        for (stage, anchor) in stage_anchors(check_in, guest.check_out, now) {
            for template in self.templates.get(&stage).into_iter().flatten() {
                let send_at = anchor + Duration::hours(template.send_offset_hours);
                let message = self.generate_message(guest, property_name, stage, Some(&template.name))?;
                messages.push(ScheduledMessage { send_at, message });
            }
        }

        messages.sort_by_key(|m| m.send_at);
        debug!(guest = %guest.name, count = messages.len(), "Scheduled guest messages");
        Ok(messages)
    }
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(chrono::NaiveTime::MIN)
}

fn stage_anchors(
    check_in: NaiveDate,
    check_out: Option<NaiveDate>,
    now: NaiveDateTime,
) -> [(BookingStage, NaiveDateTime); 6] {
    let check_in = midnight(check_in);
    let check_out = check_out.map(midnight).unwrap_or(check_in + Duration::days(3));

    [
        (BookingStage::BookingConfirmed, now),
        (BookingStage::PreArrival, check_in - Duration::days(2)),
        (BookingStage::CheckInDay, check_in),
        (BookingStage::DuringStay, check_in + Duration::days(1)),
        (BookingStage::CheckOutDay, check_out),
        (BookingStage::PostStay, check_out + Duration::days(1)),
    ]
}

fn optional(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

pub fn build_variables(guest: &Guest, property: &Property) -> Context {
    let date = |d: Option<NaiveDate>, fmt: &str| d.map(|d| d.format(fmt).to_string()).unwrap_or_default();

    [
        ("guest_name", guest.name.clone()),
        ("guest_first_name", guest.first_name().to_string()),
        ("num_guests", guest.num_guests.to_string()),
        ("check_in_date", date(guest.check_in, "%B %d, %Y")),
        ("check_out_date", date(guest.check_out, "%B %d, %Y")),
        ("check_in_day", date(guest.check_in, "%A")),
        ("property_name", property.name.clone()),
        ("address", property.address.clone()),
        ("host_name", optional(&property.host_name)),
        ("wifi_name", optional(&property.wifi_name)),
        ("wifi_password", optional(&property.wifi_password)),
        ("door_code", optional(&property.door_code)),
        ("check_in_time", property.check_in_time.clone()),
        ("check_out_time", property.check_out_time.clone()),
        ("parking_info", optional(&property.parking_info)),
        ("house_rules", optional(&property.house_rules)),
        ("local_tips", optional(&property.local_tips)),
        ("emergency_contact", optional(&property.emergency_contact)),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}
