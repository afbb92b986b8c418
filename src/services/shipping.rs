use futures::stream::{self, StreamExt};
use tracing::{info, instrument, warn};

use crate::dto::BuyLabelDto;
use crate::email;
use crate::errors::{ApiError, IntegrationError};
use crate::integrations::{Parcel, ShippingRate};
use crate::models::{Address, Order, OrderStatus};
use crate::repo::{get_order, record_shipment};
use crate::state::AppState;

/// Orders rates cheapest first, then fastest; rates without an estimate go last
pub fn sort_rates(rates: &mut [ShippingRate]) {
    rates.sort_by_key(|rate| (rate.amount_cents, rate.estimated_days.is_none(), rate.estimated_days));
}

/// Collects quotes from every configured provider at once
///
/// A provider that fails is logged and skipped. The request fails only when
/// no provider answered.
#[instrument(skip(state, to), fields(zip = %to.zip))]
pub async fn quote_rates(state: &AppState, to: &Address, parcel: Option<Parcel>) -> Result<Vec<ShippingRate>, ApiError> {
    let from = state
        .config
        .ship_from
        .as_ref()
        .ok_or(ApiError::Integration(IntegrationError::NotConfigured("ship_from")))?;
    if state.integrations.shipping.is_empty() {
        return Err(ApiError::Integration(IntegrationError::NotConfigured("shipping")));
    }
    let parcel = &parcel.unwrap_or_default();
    let providers = &state.integrations.shipping;

    let pending: Vec<_> = providers
        .iter()
        .map(|provider| async move { (provider.name(), provider.get_rates(from, to, parcel).await) })
        .collect();
    let quotes: Vec<_> = stream::iter(pending)
        .buffer_unordered(providers.len())
        .collect()
        .await;

    let mut rates = Vec::new();
    let mut last_error = None;
    for (name, result) in quotes {
        match result {
            Ok(found) => rates.extend(found),
            Err(e) => {
                warn!("{} quote failed: {}", name, e);
                last_error = Some(e);
            }
        }
    }
    if rates.is_empty() {
        if let Some(e) = last_error {
            return Err(ApiError::Integration(e));
        }
    }
    sort_rates(&mut rates);
    info!("{} rates quoted", rates.len());
    Ok(rates)
}

/// Buys a label for a paid order and marks it SHIPPED
///
/// The customer gets a shipping notification; a mail failure does not undo
/// the shipment.
#[instrument(skip(state, payload), fields(provider = %payload.provider))]
pub async fn buy_label(state: &AppState, order_id: &str, payload: BuyLabelDto) -> Result<Order, ApiError> {
    let order = get_order(&state.pool, order_id)
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Order"))?;
    if !order.get_status().can_transition_to(OrderStatus::Shipped) {
        return Err(ApiError::Conflict(format!("Order {} is {}", order.get_order_number(), order.get_status())));
    }
    let provider = state
        .integrations
        .shipping_provider(&payload.provider)
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown shipping provider {}", payload.provider)))?;
    if provider.name() == "EASYPOST" && payload.shipment_id.is_none() {
        return Err(ApiError::BadRequest("EasyPost labels need a shipment_id".to_string()));
    }

    let label = provider.buy_label(&payload.rate_id, payload.shipment_id.as_deref()).await?;
    let shipped = record_shipment(&state.pool, order_id, provider.name(), &label)
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Order"))?;
    email::deliver(&state.integrations, email::shipping_notification(&shipped)).await;
    Ok(shipped)
}
