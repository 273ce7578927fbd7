use crate::models::{BookingStage, MessageTemplate};

fn template(name: &str, stage: BookingStage, subject: Option<&str>, offset: i64, body: &str) -> MessageTemplate {
    MessageTemplate {
        name: name.to_string(),
        stage,
        subject: subject.map(str::to_string),
        body: body.to_string(),
        send_offset_hours: offset,
    }
}

/// One template per stage from confirmation through the review request.
pub fn default_templates() -> Vec<MessageTemplate> {
    vec![
        template(
            "Booking Confirmation",
            BookingStage::BookingConfirmed,
            Some("Your reservation at {property_name} is confirmed!"),
            0,
            "Hi {guest_first_name}! 👋

Thank you for booking {property_name}! We're excited to host you.

📅 Check-in: {check_in_date} at {check_in_time}
📅 Check-out: {check_out_date} at {check_out_time}

I'll send you detailed check-in instructions a couple days before your arrival.

If you have any questions before then, don't hesitate to reach out!

Best,
{host_name}",
        ),
        template(
            "Pre-Arrival Instructions",
            BookingStage::PreArrival,
            Some("Check-in details for {property_name}"),
            -48,
            "Hi {guest_first_name}! 🏔️

Your stay at {property_name} is coming up! Here are your check-in details:

📍 **Address:** {address}

🔑 **Door Code:** {door_code}

📶 **WiFi:**
- Network: {wifi_name}
- Password: {wifi_password}

🚗 **Parking:** {parking_info}

⏰ **Check-in:** {check_in_time}
⏰ **Check-out:** {check_out_time}

📋 **House Rules:**
{house_rules}

Let me know when you arrive safely!

{host_name}",
        ),
        template(
            "Check-in Day",
            BookingStage::CheckInDay,
            None,
            12,
            "Hi {guest_first_name}!

Happy check-in day! 🎉 The property is all ready for you.

As a reminder, check-in starts at {check_in_time}. The door code is {door_code}.

Safe travels, and let me know when you've settled in!

{host_name}",
        ),
        template(
            "Mid-Stay Check",
            BookingStage::DuringStay,
            None,
            18,
            "Hi {guest_first_name}!

Just checking in to make sure everything is going well with your stay!

Is there anything you need? I'm happy to help with local recommendations too.

Enjoy! 🏔️
{host_name}",
        ),
        template(
            "Check-out Reminder",
            BookingStage::CheckOutDay,
            Some("Check-out reminder for {property_name}"),
            8,
            "Good morning {guest_first_name}! ☀️

Just a friendly reminder that check-out is at {check_out_time} today.

Before you go:
- Please leave all used towels in the bathtub
- Run the dishwasher if you used dishes
- Make sure all windows and doors are locked
- Leave the key/fob on the kitchen counter

Thank you so much for staying with us! We hope you had an amazing time.

Safe travels home! 🚗

{host_name}",
        ),
        template(
            "Review Request",
            BookingStage::PostStay,
            Some("Thank you for staying at {property_name}!"),
            24,
            "Hi {guest_first_name}!

Thank you so much for being such great guests! We hope you had a wonderful time at {property_name}.

If you have a moment, we'd really appreciate it if you could leave us a review. Your feedback helps future guests and helps us improve! ⭐

We'd love to host you again anytime!

Warmly,
{host_name}",
        ),
    ]
}
