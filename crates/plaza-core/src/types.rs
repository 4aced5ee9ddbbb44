use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Generate an opaque entity id (UUIDv4 string).
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Messaging platform an order or session originated from.
///
/// `Dashboard` is only ever an order source (business staff entering orders
/// by hand); it never appears as a conversation platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Whatsapp,
    Telegram,
    Instagram,
    Facebook,
    Dashboard,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Whatsapp => "whatsapp",
            Platform::Telegram => "telegram",
            Platform::Instagram => "instagram",
            Platform::Facebook => "facebook",
            Platform::Dashboard => "dashboard",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "whatsapp" => Ok(Platform::Whatsapp),
            "telegram" => Ok(Platform::Telegram),
            "instagram" => Ok(Platform::Instagram),
            "facebook" => Ok(Platform::Facebook),
            "dashboard" => Ok(Platform::Dashboard),
            other => Err(format!("unknown platform: {}", other)),
        }
    }
}

/// Principal variant stored in the `users` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    Admin,
    BusinessOwner,
    Branch,
    Employee,
}

impl PrincipalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrincipalKind::Admin => "admin",
            PrincipalKind::BusinessOwner => "business_owner",
            PrincipalKind::Branch => "branch",
            PrincipalKind::Employee => "employee",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, PrincipalKind::Admin)
    }
}

impl fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PrincipalKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "admin" => Ok(PrincipalKind::Admin),
            "business_owner" => Ok(PrincipalKind::BusinessOwner),
            "branch" => Ok(PrincipalKind::Branch),
            "employee" => Ok(PrincipalKind::Employee),
            other => Err(format!("unknown principal kind: {}", other)),
        }
    }
}

/// Vertical the business operates in. Gates business-type-specific toolsets
/// (table reservations are F&B only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessType {
    FoodAndBeverage,
    Salon,
    Rental,
    Other,
}

impl BusinessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusinessType::FoodAndBeverage => "food_and_beverage",
            BusinessType::Salon => "salon",
            BusinessType::Rental => "rental",
            BusinessType::Other => "other",
        }
    }
}

impl fmt::Display for BusinessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BusinessType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "food_and_beverage" => Ok(BusinessType::FoodAndBeverage),
            "salon" => Ok(BusinessType::Salon),
            "rental" => Ok(BusinessType::Rental),
            "other" => Ok(BusinessType::Other),
            other => Err(format!("unknown business type: {}", other)),
        }
    }
}

/// How an order reaches the customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryType {
    Takeaway,
    Delivery,
    OnSite,
}

impl DeliveryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryType::Takeaway => "takeaway",
            DeliveryType::Delivery => "delivery",
            DeliveryType::OnSite => "on_site",
        }
    }
}

impl fmt::Display for DeliveryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeliveryType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "takeaway" => Ok(DeliveryType::Takeaway),
            "delivery" => Ok(DeliveryType::Delivery),
            "on_site" => Ok(DeliveryType::OnSite),
            other => Err(format!("unknown delivery type: {}", other)),
        }
    }
}

/// Order lifecycle status.
///
/// `Cart` is the in-progress basket; the legal transitions out of every other
/// state are enforced by `plaza-orders`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Cart,
    Accepted,
    Ongoing,
    Ready,
    Completed,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Cart => "cart",
            OrderStatus::Accepted => "accepted",
            OrderStatus::Ongoing => "ongoing",
            OrderStatus::Ready => "ready",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Rejected => "rejected",
        }
    }

    /// Terminal states admit no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "cart" => Ok(OrderStatus::Cart),
            "accepted" => Ok(OrderStatus::Accepted),
            "ongoing" => Ok(OrderStatus::Ongoing),
            "ready" => Ok(OrderStatus::Ready),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "rejected" => Ok(OrderStatus::Rejected),
            other => Err(format!("unknown order status: {}", other)),
        }
    }
}

/// Distinguishes immediate orders from future-dated scheduled requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    Order,
    ScheduledRequest,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Order => "order",
            RequestType::ScheduledRequest => "scheduled_request",
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RequestType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "order" => Ok(RequestType::Order),
            "scheduled_request" => Ok(RequestType::ScheduledRequest),
            other => Err(format!("unknown request type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(format!("unknown payment status: {}", other)),
        }
    }
}

/// Reservation lifecycle. `Confirmed` is the only state that occupies a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Confirmed,
    Cancelled,
    Completed,
    NoShow,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Completed => "completed",
            ReservationStatus::NoShow => "no_show",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReservationStatus::Confirmed)
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "confirmed" => Ok(ReservationStatus::Confirmed),
            "cancelled" => Ok(ReservationStatus::Cancelled),
            "completed" => Ok(ReservationStatus::Completed),
            "no_show" => Ok(ReservationStatus::NoShow),
            other => Err(format!("unknown reservation status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationType {
    Table,
    Appointment,
}

impl ReservationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationType::Table => "table",
            ReservationType::Appointment => "appointment",
        }
    }
}

impl fmt::Display for ReservationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReservationType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "table" => Ok(ReservationType::Table),
            "appointment" => Ok(ReservationType::Appointment),
            other => Err(format!("unknown reservation type: {}", other)),
        }
    }
}

/// Conversation session state. `HumanLocked` suppresses all bot tool use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    BotActive,
    HumanLocked,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::BotActive => "bot_active",
            SessionState::HumanLocked => "human_locked",
            SessionState::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SessionState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "bot_active" => Ok(SessionState::BotActive),
            "human_locked" => Ok(SessionState::HumanLocked),
            "closed" => Ok(SessionState::Closed),
            other => Err(format!("unknown session state: {}", other)),
        }
    }
}

/// Who authored a chat or ticket message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderKind {
    Customer,
    Bot,
    Employee,
    System,
}

impl SenderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderKind::Customer => "customer",
            SenderKind::Bot => "bot",
            SenderKind::Employee => "employee",
            SenderKind::System => "system",
        }
    }
}

impl fmt::Display for SenderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SenderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "customer" => Ok(SenderKind::Customer),
            "bot" => Ok(SenderKind::Bot),
            "employee" => Ok(SenderKind::Employee),
            "system" => Ok(SenderKind::System),
            other => Err(format!("unknown sender kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    WaitingCustomer,
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::WaitingCustomer => "waiting_customer",
            TicketStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "open" => Ok(TicketStatus::Open),
            "in_progress" => Ok(TicketStatus::InProgress),
            "waiting_customer" => Ok(TicketStatus::WaitingCustomer),
            "closed" => Ok(TicketStatus::Closed),
            other => Err(format!("unknown ticket status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl TicketPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketPriority::Low => "low",
            TicketPriority::Medium => "medium",
            TicketPriority::High => "high",
            TicketPriority::Urgent => "urgent",
        }
    }
}

impl fmt::Display for TicketPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TicketPriority {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "low" => Ok(TicketPriority::Low),
            "medium" => Ok(TicketPriority::Medium),
            "high" => Ok(TicketPriority::High),
            "urgent" => Ok(TicketPriority::Urgent),
            other => Err(format!("unknown ticket priority: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Good,
    Service,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Good => "good",
            ItemType::Service => "service",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ItemType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "good" => Ok(ItemType::Good),
            "service" => Ok(ItemType::Service),
            other => Err(format!("unknown item type: {}", other)),
        }
    }
}

/// Customer-facing availability of a catalog item. `Hidden` items never
/// appear in search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemAvailability {
    Available,
    Unavailable,
    Hidden,
}

impl ItemAvailability {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemAvailability::Available => "available",
            ItemAvailability::Unavailable => "unavailable",
            ItemAvailability::Hidden => "hidden",
        }
    }
}

impl fmt::Display for ItemAvailability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ItemAvailability {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "available" => Ok(ItemAvailability::Available),
            "unavailable" => Ok(ItemAvailability::Unavailable),
            "hidden" => Ok(ItemAvailability::Hidden),
            other => Err(format!("unknown availability: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn order_status_roundtrip() {
        for s in [
            OrderStatus::Cart,
            OrderStatus::Accepted,
            OrderStatus::Ongoing,
            OrderStatus::Ready,
            OrderStatus::Completed,
            OrderStatus::Cancelled,
            OrderStatus::Rejected,
        ] {
            assert_eq!(OrderStatus::from_str(s.as_str()).unwrap(), s);
        }
    }

    #[test]
    fn terminal_states() {
        assert!(OrderStatus::Completed.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(!OrderStatus::Accepted.is_terminal());
        assert!(!OrderStatus::Cart.is_terminal());
        assert!(ReservationStatus::NoShow.is_terminal());
        assert!(!ReservationStatus::Confirmed.is_terminal());
    }

    #[test]
    fn unknown_strings_are_rejected() {
        assert!(Platform::from_str("sms").is_err());
        assert!(DeliveryType::from_str("drone").is_err());
        assert!(OrderStatus::from_str("").is_err());
    }
}
