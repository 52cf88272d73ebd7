//! The services of `simple-server`.

use crate::pb::grpc_simple::*;
use chrono::{DateTime, Datelike, Utc};
use prost_types::Timestamp;
use rpchost::registry::{Registry, RegistryError, ServiceDefinition};
use rpchost::{Request, Status};
use std::time::Duration;
use tracing::debug;

const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Simulated work done by `GetDate`.
const DATE_LOOKUP_DELAY: Duration = Duration::from_secs(1);

/// Register `Greeter`, `TimeKeeper`, `Debugger` and `TestService`.
pub fn register(registry: &mut Registry) -> Result<(), RegistryError> {
    registry.register(
        ServiceDefinition::builder("grpc_simple.Greeter")
            .unary("SayHello", say_hello)
            .build(),
    )?;
    registry.register(
        ServiceDefinition::builder("grpc_simple.TimeKeeper")
            .unary("GetDate", get_date)
            .unary("GetNameOfMonth", get_name_of_month)
            .unary("GetSeason", get_season)
            .build(),
    )?;
    registry.register(crate::debugger::definition())?;
    registry.register(
        ServiceDefinition::builder("grpc_simple.TestService")
            .unary("Simple", simple)
            .build(),
    )
}

async fn say_hello(request: Request<HelloReq>) -> Result<HelloResp, Status> {
    Ok(HelloResp {
        message: format!("Hello {}", request.get_ref().name),
    })
}

async fn simple(request: Request<SimpleReq>) -> Result<SimpleResp, Status> {
    Ok(SimpleResp {
        response: format!("Received: {}", request.get_ref().number),
    })
}

async fn get_date(request: Request<GetDateReq>) -> Result<GetDateResp, Status> {
    let now = timestamp(Utc::now());

    let cancellation = request.context().cancellation();
    tokio::select! {
        _ = tokio::time::sleep(DATE_LOOKUP_DELAY) => {}
        _ = cancellation.cancelled() => {
            debug!(reason = ?cancellation.reason(), "date lookup abandoned");
            return Err(Status::cancelled("date lookup abandoned"));
        }
    }

    Ok(GetDateResp { date: Some(now) })
}

async fn get_name_of_month(
    request: Request<GetNameOfMonthReq>,
) -> Result<GetNameOfMonthResp, Status> {
    let number = request.get_ref().number;
    month_name(number)
        .map(|name| GetNameOfMonthResp { name: name.into() })
        .ok_or_else(|| Status::invalid_argument(format!("number must be 1..12, got {}", number)))
}

async fn get_season(request: Request<GetSeasonReq>) -> Result<GetSeasonResp, Status> {
    let date = request
        .into_inner()
        .date
        .ok_or_else(|| Status::invalid_argument("date is required"))?;

    let date = DateTime::from_timestamp(date.seconds, date.nanos.max(0) as u32)
        .ok_or_else(|| Status::invalid_argument("date is out of range"))?;

    Ok(GetSeasonResp {
        season: season(date.month(), date.day()).into(),
    })
}

pub(crate) fn month_name(number: i32) -> Option<&'static str> {
    let index = usize::try_from(number).ok()?.checked_sub(1)?;
    MONTHS.get(index).copied()
}

/// The season of the northern hemisphere on day `day` of month `month`.
pub(crate) fn season(month: u32, day: u32) -> &'static str {
    match (month, day) {
        (12 | 1 | 2, _) => "Winter",
        (3, d) if d < 20 => "Winter",
        (3..=5, _) => "Spring",
        (6, d) if d < 21 => "Spring",
        (6..=8, _) => "Summer",
        (9, d) if d < 22 => "Summer",
        (9..=11, _) => "Autumn",
        _ => "Undefined",
    }
}

pub(crate) fn timestamp(at: DateTime<Utc>) -> Timestamp {
    Timestamp {
        seconds: at.timestamp(),
        nanos: at.timestamp_subsec_nanos() as i32,
    }
}
