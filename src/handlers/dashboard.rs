use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use futures_util::TryStreamExt;
use mongodb::bson::{doc, DateTime as BsonDateTime};
use mongodb::Collection;
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, Result};
use crate::models::appointment::Appointment;
use crate::models::project::{Project, PROJECT_STATUSES};
use crate::models::user::{Claims, User, ROLE_CLIENT};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub total_clients: u64,
    pub projects_by_status: HashMap<String, u64>,
    pub upcoming_appointments: u64,
    pub unread_messages: u64,
}

// GET /api/dashboard/stats - admin-gated by the router
pub async fn get_stats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<DashboardStats>> {
    let users: Collection<User> = state.db.collection("users");
    let projects: Collection<Project> = state.db.collection("projects");
    let appointments: Collection<Appointment> = state.db.collection("appointments");
    let messages: Collection<crate::models::message::Message> = state.db.collection("messages");

    let total_clients = users.count_documents(doc! { "role": ROLE_CLIENT }).await?;

    let mut projects_by_status = HashMap::new();
    for status in PROJECT_STATUSES {
        let count = projects.count_documents(doc! { "status": status }).await?;
        projects_by_status.insert(status.to_string(), count);
    }

    let now = BsonDateTime::now();
    let upcoming_appointments = appointments
        .count_documents(doc! {
            "scheduled_for": { "$gte": now },
            "status": { "$in": ["requested", "confirmed"] }
        })
        .await?;

    let unread_messages = messages
        .count_documents(doc! { "recipient_id": &claims.sub, "seen": false })
        .await?;

    Ok(Json(DashboardStats {
        total_clients,
        projects_by_status,
        upcoming_appointments,
        unread_messages,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub format: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReportRow {
    pub client_id: String,
    pub client_name: String,
    pub projects: u64,
    pub completed_projects: u64,
    pub total_budget: f64,
    pub appointments: u64,
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub from: String,
    pub to: String,
    pub rows: Vec<ReportRow>,
}

fn parse_report_date(value: &str) -> Result<chrono::DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| AppError::invalid_data(format!("Invalid date: {}", value)))?;
    let datetime = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| AppError::invalid_data(format!("Invalid date: {}", value)))?;
    Ok(Utc.from_utc_datetime(&datetime))
}

fn row_entry<'a>(
    rows: &'a mut HashMap<String, ReportRow>,
    client_id: &str,
    client_names: &HashMap<String, String>,
) -> &'a mut ReportRow {
    rows.entry(client_id.to_string()).or_insert_with(|| ReportRow {
        client_id: client_id.to_string(),
        client_name: client_names
            .get(client_id)
            .cloned()
            .unwrap_or_else(|| "Unknown".to_string()),
        projects: 0,
        completed_projects: 0,
        total_budget: 0.0,
        appointments: 0,
    })
}

fn build_report_rows(
    projects: &[Project],
    appointments: &[Appointment],
    client_names: &HashMap<String, String>,
) -> Vec<ReportRow> {
    let mut rows: HashMap<String, ReportRow> = HashMap::new();

    for project in projects {
        let row = row_entry(&mut rows, &project.client_id, client_names);
        row.projects += 1;
        row.total_budget += project.budget;
        if project.status == "completed" {
            row.completed_projects += 1;
        }
    }

    for appointment in appointments {
        let row = row_entry(&mut rows, &appointment.client_id, client_names);
        row.appointments += 1;
    }

    let mut rows: Vec<ReportRow> = rows.into_values().collect();
    rows.sort_by(|a, b| a.client_name.cmp(&b.client_name).then(a.client_id.cmp(&b.client_id)));
    rows
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn render_csv(rows: &[ReportRow]) -> String {
    let mut out = String::from("client_id,client_name,projects,completed_projects,total_budget,appointments\n");
    for row in rows {
        out.push_str(&format!(
            "{},{},{},{},{:.2},{}\n",
            csv_field(&row.client_id),
            csv_field(&row.client_name),
            row.projects,
            row.completed_projects,
            row.total_budget,
            row.appointments,
        ));
    }
    out
}

// GET /api/dashboard/report?from=YYYY-MM-DD&to=YYYY-MM-DD&format=json|csv
pub async fn get_report(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Result<Response> {
    let to = match &query.to {
        Some(value) => parse_report_date(value)? + Duration::days(1),
        None => Utc::now(),
    };
    let from = match &query.from {
        Some(value) => parse_report_date(value)?,
        None => to - Duration::days(30),
    };
    if from > to {
        return Err(AppError::invalid_data("'from' must not be after 'to'"));
    }

    let from_bson = BsonDateTime::from_millis(from.timestamp_millis());
    let to_bson = BsonDateTime::from_millis(to.timestamp_millis());
    let range = doc! { "$gte": from_bson, "$lt": to_bson };

    let projects: Collection<Project> = state.db.collection("projects");
    let appointments: Collection<Appointment> = state.db.collection("appointments");
    let users: Collection<User> = state.db.collection("users");

    let projects: Vec<Project> = projects
        .find(doc! { "created_at": range.clone() })
        .await?
        .try_collect()
        .await?;
    let appointments: Vec<Appointment> = appointments
        .find(doc! { "scheduled_for": range })
        .await?
        .try_collect()
        .await?;

    let clients: Vec<User> = users
        .find(doc! { "role": ROLE_CLIENT })
        .await?
        .try_collect()
        .await?;
    let client_names: HashMap<String, String> = clients
        .into_iter()
        .filter_map(|user| user._id.map(|id| (id.to_hex(), user.name)))
        .collect();

    let rows = build_report_rows(&projects, &appointments, &client_names);

    let report = Report {
        from: from.to_rfc3339(),
        to: to.to_rfc3339(),
        rows,
    };

    match query.format.as_deref() {
        Some("csv") => {
            let csv = render_csv(&report.rows);
            Ok((
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                    (header::CONTENT_DISPOSITION, "attachment; filename=\"report.csv\""),
                ],
                csv,
            )
                .into_response())
        }
        Some("json") | None => Ok(Json(report).into_response()),
        Some(other) => Err(AppError::invalid_data(format!("Unknown report format: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::DateTime;

    fn project(client_id: &str, status: &str, budget: f64) -> Project {
        Project {
            id: None,
            client_id: client_id.to_string(),
            title: "Campaign".to_string(),
            description: String::new(),
            status: status.to_string(),
            budget,
            due_date: None,
            created_at: DateTime::now(),
            updated_at: DateTime::now(),
        }
    }

    fn appointment(client_id: &str) -> Appointment {
        Appointment {
            id: None,
            client_id: client_id.to_string(),
            topic: "Kickoff".to_string(),
            scheduled_for: DateTime::now(),
            duration_minutes: 30,
            status: "confirmed".to_string(),
            notes: None,
            created_at: DateTime::now(),
            updated_at: DateTime::now(),
        }
    }

    #[test]
    fn report_rows_aggregate_per_client() {
        let projects = vec![
            project("c1", "completed", 1000.0),
            project("c1", "in_progress", 500.0),
            project("c2", "planned", 250.0),
        ];
        let appointments = vec![appointment("c1"), appointment("c3")];
        let names: HashMap<String, String> = [
            ("c1".to_string(), "Acme".to_string()),
            ("c2".to_string(), "Borealis".to_string()),
        ]
        .into_iter()
        .collect();

        let rows = build_report_rows(&projects, &appointments, &names);

        assert_eq!(rows.len(), 3);
        let acme = rows.iter().find(|r| r.client_id == "c1").unwrap();
        assert_eq!(acme.projects, 2);
        assert_eq!(acme.completed_projects, 1);
        assert_eq!(acme.total_budget, 1500.0);
        assert_eq!(acme.appointments, 1);

        // clients without a user record still show up
        let unknown = rows.iter().find(|r| r.client_id == "c3").unwrap();
        assert_eq!(unknown.client_name, "Unknown");
        assert_eq!(unknown.appointments, 1);
    }

    #[test]
    fn csv_output_is_quoted_where_needed() {
        let rows = vec![ReportRow {
            client_id: "c1".to_string(),
            client_name: "Acme, Inc \"West\"".to_string(),
            projects: 2,
            completed_projects: 1,
            total_budget: 1500.5,
            appointments: 3,
        }];

        let csv = render_csv(&rows);
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "client_id,client_name,projects,completed_projects,total_budget,appointments"
        );
        assert_eq!(
            lines.next().unwrap(),
            "c1,\"Acme, Inc \"\"West\"\"\",2,1,1500.50,3"
        );
    }

    #[test]
    fn report_dates_parse_and_reject() {
        assert!(parse_report_date("2026-01-31").is_ok());
        assert!(parse_report_date("31/01/2026").is_err());
        assert!(parse_report_date("not-a-date").is_err());
    }
}
