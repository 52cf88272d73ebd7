//! `grpc_simple.OrderService` of `reflection-server`.

use crate::pb::grpc_simple::{GetOrderReq, GetOrderResp, ListOrdersReq, ListOrdersResp, Order};
use rpchost::registry::{Registry, RegistryError, ServiceDefinition};
use rpchost::{Request, Status};

/// Register `OrderService` and `Debugger`.
pub fn register(registry: &mut Registry) -> Result<(), RegistryError> {
    registry.register(
        ServiceDefinition::builder("grpc_simple.OrderService")
            .unary("GetOrder", get_order)
            .unary("ListOrders", list_orders)
            .build(),
    )?;
    registry.register(crate::debugger::definition())
}

async fn get_order(request: Request<GetOrderReq>) -> Result<GetOrderResp, Status> {
    Ok(GetOrderResp {
        order: Some(Order {
            id: request.into_inner().order_id,
            name: "Dummy Order".into(),
        }),
    })
}

async fn list_orders(_: Request<ListOrdersReq>) -> Result<ListOrdersResp, Status> {
    Ok(ListOrdersResp {
        orders: vec![Order {
            id: "1".into(),
            name: "Dummy Order".into(),
        }],
    })
}
