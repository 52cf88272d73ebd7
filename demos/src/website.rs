//! `order.OrderService` and `price.PriceService` of `website-server`.

use crate::pb::{order, price};
use crate::simple::timestamp;
use chrono::{TimeZone, Utc};
use rpchost::registry::{Registry, RegistryError, ServiceDefinition};
use rpchost::{Request, Status};

/// Register `OrderService` and `PriceService`.
pub fn register(registry: &mut Registry) -> Result<(), RegistryError> {
    registry.register(
        ServiceDefinition::builder("order.OrderService")
            .unary("GetOrder", get_order)
            .build(),
    )?;
    registry.register(
        ServiceDefinition::builder("price.PriceService")
            .unary("GetPrice", get_price)
            .build(),
    )
}

async fn get_order(_: Request<order::GetOrderReq>) -> Result<order::GetOrderResp, Status> {
    let created_at = Utc
        .with_ymd_and_hms(2024, 12, 1, 10, 0, 0)
        .single()
        .map(timestamp);

    Ok(order::GetOrderResp {
        order: Some(order::Order {
            id: "123".into(),
            name: "Sample Order".into(),
            status: "shipped".into(),
            created_at,
            updated_at: Some(timestamp(Utc::now())),
        }),
    })
}

async fn get_price(_: Request<price::GetPriceReq>) -> Result<price::GetPriceResp, Status> {
    Err(Status::unimplemented("method GetPrice not implemented"))
}
