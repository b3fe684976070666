#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use repairdesk_api::{
    clock::ManualClock,
    config::{AppConfig, ConfigHandle},
    db::{self, DbConfig},
    documents::JsonDocumentRenderer,
    entities::{catalog_item, client, equipment, technician, work_order, CatalogItemType},
    events::{self, EventSender},
    handlers::{AppServices, TECHNICIAN_HEADER},
    notifications::RecordingDispatcher,
    random::OsSecureRandom,
    services::work_orders::{Classification, CreateWorkOrderInput, IntakeFields},
    AppState,
};
use tower::ServiceExt;
use uuid::Uuid;

pub const CLIENT_EMAIL: &str = "ana.torres@example.com";

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
}

pub fn test_config() -> AppConfig {
    let mut cfg = AppConfig::new(
        "sqlite::memory:".to_string(),
        "127.0.0.1".to_string(),
        18_080,
        "test".to_string(),
    );
    // Every pooled connection would get its own in-memory database.
    cfg.db_max_connections = 1;
    cfg.db_min_connections = 1;
    cfg
}

/// Helper harness for spinning up an application state backed by an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub clock: ManualClock,
    pub mailer: RecordingDispatcher,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(cfg: AppConfig) -> Self {
        let pool = db::establish_connection_with_config(&DbConfig::from(&cfg))
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations");
        let db = Arc::new(pool);

        let (event_sender, event_rx) = EventSender::channel(cfg.event_channel_capacity);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let clock = ManualClock::new(start_time());
        let mailer = RecordingDispatcher::new();
        let config = ConfigHandle::new(cfg);

        let services = AppServices::new(
            db.clone(),
            Arc::new(event_sender),
            config.clone(),
            Arc::new(clock.clone()),
            Arc::new(OsSecureRandom),
            Arc::new(mailer.clone()),
            Arc::new(JsonDocumentRenderer),
        );
        let state = AppState {
            db,
            config,
            services,
        };
        let router = repairdesk_api::build_router(state.clone());

        Self {
            router,
            state,
            clock,
            mailer,
            _event_task: event_task,
        }
    }

    pub fn services(&self) -> &AppServices {
        &self.state.services
    }

    /// Inserts CLI001/CLI002 with one piece of equipment each, and TEC1/TEC2.
    pub async fn seed_parties(&self) {
        let db = &*self.state.db;
        let now = start_time();

        for (id, name, email) in [
            ("CLI001", "Ana Torres", CLIENT_EMAIL),
            ("CLI002", "Bruno Vega", "bruno.vega@example.com"),
        ] {
            client::ActiveModel {
                id: Set(id.to_string()),
                name: Set(name.to_string()),
                email: Set(email.to_string()),
                phone: Set(Some("+593 99 000 0000".to_string())),
                created_at: Set(now),
            }
            .insert(db)
            .await
            .expect("seed client");
        }

        for (id, name) in [("TEC1", "Luis Paredes"), ("TEC2", "Marta Ruiz")] {
            technician::ActiveModel {
                id: Set(id.to_string()),
                name: Set(name.to_string()),
                email: Set(format!("{}@repairdesk.local", id.to_lowercase())),
                active: Set(true),
                created_at: Set(now),
            }
            .insert(db)
            .await
            .expect("seed technician");
        }

        for (id, client_id, kind, brand, model) in [
            ("EQ1", "CLI001", "Laptop", "Lenovo", "ThinkPad T14"),
            ("EQ2", "CLI002", "Printer", "Epson", "L3150"),
        ] {
            equipment::ActiveModel {
                id: Set(id.to_string()),
                client_id: Set(client_id.to_string()),
                kind: Set(kind.to_string()),
                brand: Set(brand.to_string()),
                model_name: Set(model.to_string()),
                serial_number: Set(None),
                created_at: Set(now),
            }
            .insert(db)
            .await
            .expect("seed equipment");
        }
    }

    pub async fn seed_catalog_item(
        &self,
        item_type: CatalogItemType,
        description: &str,
        unit_cost: Decimal,
        active: bool,
    ) -> Uuid {
        let id = Uuid::new_v4();
        catalog_item::ActiveModel {
            id: Set(id),
            item_type: Set(item_type),
            description: Set(description.to_string()),
            unit_cost: Set(unit_cost),
            active: Set(active),
            created_at: Set(start_time()),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed catalog item");
        id
    }

    pub async fn create_order(
        &self,
        client_id: &str,
        equipment_id: &str,
        technician_id: &str,
    ) -> work_order::Model {
        self.services()
            .work_orders
            .create_order(order_input(client_id, equipment_id, Some(technician_id)), None)
            .await
            .expect("create order")
    }

    /// Code carried by the most recent OTP mail.
    pub fn last_code(&self) -> String {
        let message = self.mailer.last().expect("no mail was sent");
        extract_code(&message.body).expect("mail carries no code")
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(path);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    pub async fn request_as_technician(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        technician_id: &str,
    ) -> (StatusCode, Value) {
        self.request(method, path, body, &[(TECHNICIAN_HEADER, technician_id)])
            .await
    }
}

pub fn order_input(
    client_id: &str,
    equipment_id: &str,
    technician_id: Option<&str>,
) -> CreateWorkOrderInput {
    CreateWorkOrderInput {
        client_id: client_id.to_string(),
        technician_id: technician_id.map(str::to_string),
        equipment_id: equipment_id.to_string(),
        intake: IntakeFields {
            contact_medium: Some("WhatsApp".to_string()),
            device_password: Some("1234".to_string()),
            accessories: Some("Charger".to_string()),
            reported_problem: "Does not power on".to_string(),
            intake_observations: Some("Scratched lid".to_string()),
        },
        classification: Classification {
            service_type: "REPAIR".to_string(),
            priority: "NORMAL".to_string(),
        },
    }
}

pub fn extract_code(body: &str) -> Option<String> {
    body.split(|c: char| !c.is_ascii_digit())
        .find(|part| part.len() == 6)
        .map(str::to_string)
}

/// A code guaranteed to differ from `code`.
pub fn wrong_code(code: &str) -> String {
    code.chars()
        .map(|c| match c {
            '9' => '0',
            d => char::from(d as u8 + 1),
        })
        .collect()
}
