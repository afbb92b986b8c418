use chrono::{Datelike, Days, Months, NaiveDate};
use diesel::deserialize::{FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::sqlite::{Sqlite, SqliteValue};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Returned when a stored or submitted status string names no known variant
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Declares a status enum stored as upper-case TEXT
///
/// The generated type serializes to the same string in JSON and in the
/// database, parses with `FromStr`, and lists its variants in `ALL`.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow)]
        #[diesel(sql_type = Text)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_uppercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(UnknownVariant { kind: stringify!($name), value: s.to_string() }),
                }
            }
        }

        impl FromSql<Text, Sqlite> for $name {
            fn from_sql(value: SqliteValue<'_, '_, '_>) -> diesel::deserialize::Result<Self> {
                let text = <String as FromSql<Text, Sqlite>>::from_sql(value)?;
                Ok(text.parse::<$name>()?)
            }
        }

        impl ToSql<Text, Sqlite> for $name {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
                out.set_value(self.as_str());
                Ok(IsNull::No)
            }
        }
    };
}

text_enum! {
    /// How a product reaches the customer
    Fulfillment {
        InHouse => "IN_HOUSE",
        PrintOnDemand => "PRINT_ON_DEMAND",
    }
}

text_enum! {
    /// Lifecycle of a storefront order
    OrderStatus {
        Pending => "PENDING",
        Paid => "PAID",
        Processing => "PROCESSING",
        Shipped => "SHIPPED",
        Delivered => "DELIVERED",
        Cancelled => "CANCELLED",
        Refunded => "REFUNDED",
    }
}

impl OrderStatus {
    /// Whether an order may move from this status to `next`
    ///
    /// CANCELLED and REFUNDED are terminal. Moving to the current status is
    /// not a transition.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (Pending, Paid) | (Pending, Cancelled) => true,
            (Paid, Processing) | (Paid, Shipped) | (Paid, Cancelled) | (Paid, Refunded) => true,
            (Processing, Shipped) | (Processing, Cancelled) | (Processing, Refunded) => true,
            (Shipped, Delivered) | (Shipped, Refunded) => true,
            (Delivered, Refunded) => true,
            _ => false,
        }
    }
}

text_enum! {
    /// State of a print-on-demand submission
    PrintOrderStatus {
        Pending => "PENDING",
        Submitted => "SUBMITTED",
        Failed => "FAILED",
        Fulfilled => "FULFILLED",
        Cancelled => "CANCELLED",
    }
}

text_enum! {
    InvoiceStatus {
        Draft => "DRAFT",
        Sent => "SENT",
        Paid => "PAID",
        Overdue => "OVERDUE",
        Cancelled => "CANCELLED",
    }
}

impl InvoiceStatus {
    /// Whether a customer can currently pay an invoice in this status
    pub fn is_payable(&self) -> bool {
        matches!(self, InvoiceStatus::Sent | InvoiceStatus::Overdue)
    }
}

text_enum! {
    ContractStatus {
        Draft => "DRAFT",
        Sent => "SENT",
        Signed => "SIGNED",
        Cancelled => "CANCELLED",
    }
}

text_enum! {
    /// Which side of a contract a signature field belongs to
    SignatureParty {
        Client => "CLIENT",
        Admin => "ADMIN",
    }
}

text_enum! {
    PartnerStatus {
        Active => "ACTIVE",
        Inactive => "INACTIVE",
    }
}

text_enum! {
    /// Commission state for a partner referral
    ReferralStatus {
        Pending => "PENDING",
        Approved => "APPROVED",
        Paid => "PAID",
        Void => "VOID",
    }
}

text_enum! {
    AffiliateStatus {
        Active => "ACTIVE",
        Suspended => "SUSPENDED",
    }
}

text_enum! {
    /// A MotoRev app event credited to an affiliate
    ReferralEvent {
        Signup => "SIGNUP",
        ProConversion => "PRO_CONVERSION",
    }
}

impl ReferralEvent {
    /// Points credited to the referring affiliate for this event
    pub fn points(&self) -> i32 {
        match self {
            ReferralEvent::Signup => 10,
            ReferralEvent::ProConversion => 50,
        }
    }

    /// Whether the event carries a paid amount that earns commission
    pub fn earns_commission(&self) -> bool {
        matches!(self, ReferralEvent::ProConversion)
    }
}

text_enum! {
    InquiryStatus {
        New => "NEW",
        Contacted => "CONTACTED",
        Closed => "CLOSED",
    }
}

text_enum! {
    /// How often a recurring bill comes due
    BillFrequency {
        Weekly => "WEEKLY",
        Monthly => "MONTHLY",
        Quarterly => "QUARTERLY",
        Yearly => "YEARLY",
    }
}

impl BillFrequency {
    /// The due date following `date` for a bill due on `anchor_day`
    ///
    /// Month-based frequencies land on `anchor_day`, clamped to the last day
    /// of shorter months. A bill anchored on the 31st is due February 28th
    /// and then March 31st again.
    pub fn advance(&self, date: NaiveDate, anchor_day: u32) -> Option<NaiveDate> {
        match self {
            BillFrequency::Weekly => date.checked_add_days(Days::new(7)),
            BillFrequency::Monthly => add_months_on_day(date, 1, anchor_day),
            BillFrequency::Quarterly => add_months_on_day(date, 3, anchor_day),
            BillFrequency::Yearly => add_months_on_day(date, 12, anchor_day),
        }
    }
}

fn add_months_on_day(date: NaiveDate, months: u32, day: u32) -> Option<NaiveDate> {
    let first = date.with_day(1)?.checked_add_months(Months::new(months))?;
    let last = first.checked_add_months(Months::new(1))?.pred_opt()?.day();
    first.with_day(day.clamp(1, last))
}

text_enum! {
    BillInstanceStatus {
        Pending => "PENDING",
        Paid => "PAID",
        Skipped => "SKIPPED",
    }
}

text_enum! {
    /// Review state of a bill found in the mailbox
    ProposalStatus {
        Pending => "PENDING",
        Approved => "APPROVED",
        Rejected => "REJECTED",
    }
}


#[cfg(test)]
mod prop_tests;
