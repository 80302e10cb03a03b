use crate::{
    db::DbPool,
    models::{self, Automation, NewAutomation, UpdateAutomation},
    schema::automations,
    services::Engine,
};
use actix_web::{delete, get, post, put, web, HttpResponse, Responder};
use diesel::prelude::*;

/// List all automations
#[get("")]
pub async fn list_automations(pool: web::Data<DbPool>) -> impl Responder {
    let mut conn = match pool.get() {
        Ok(c) => c,
        Err(_) => return HttpResponse::InternalServerError().body("Database connection error"),
    };

    match automations::table
        .select(Automation::as_select())
        .load(&mut conn)
    {
        Ok(list) => HttpResponse::Ok().json(list),
        Err(_) => HttpResponse::InternalServerError().body("Error fetching automations"),
    }
}

/// Get a single automation by ID
#[get("/{automation_id}")]
pub async fn get_automation(pool: web::Data<DbPool>, path: web::Path<i32>) -> impl Responder {
    let mut conn = match pool.get() {
        Ok(c) => c,
        Err(_) => return HttpResponse::InternalServerError().body("Database connection error"),
    };

    match automations::table
        .find(path.into_inner())
        .select(Automation::as_select())
        .first(&mut conn)
        .optional()
    {
        Ok(Some(automation)) => HttpResponse::Ok().json(automation),
        Ok(None) => HttpResponse::NotFound().body("Automation not found"),
        Err(_) => HttpResponse::InternalServerError().body("Error fetching automation"),
    }
}

/// Create a new automation. The YAML definition is validated against the
/// catalog before anything is stored.
#[post("")]
pub async fn create_automation(
    pool: web::Data<DbPool>,
    engine: web::Data<Engine>,
    body: web::Json<NewAutomation>,
) -> impl Responder {
    let mut conn = match pool.get() {
        Ok(c) => c,
        Err(_) => return HttpResponse::InternalServerError().body("Database connection error"),
    };

    let new_automation = body.into_inner();
    if let Err(e) = models::validate_automation_definition(&mut conn, &new_automation.definition) {
        return HttpResponse::BadRequest().body(e.to_string());
    }

    let created: Automation = match diesel::insert_into(automations::table)
        .values(&new_automation)
        .returning(Automation::as_returning())
        .get_result(&mut conn)
    {
        Ok(a) => a,
        Err(diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _,
        )) => return HttpResponse::BadRequest().body("Automation name already exists"),
        Err(_) => return HttpResponse::InternalServerError().body("Error creating automation"),
    };

    engine.invalidate_names().await;
    HttpResponse::Created().json(created)
}

/// Update an existing automation
#[put("/{automation_id}")]
pub async fn update_automation(
    pool: web::Data<DbPool>,
    engine: web::Data<Engine>,
    path: web::Path<i32>,
    body: web::Json<UpdateAutomation>,
) -> impl Responder {
    let mut conn = match pool.get() {
        Ok(c) => c,
        Err(_) => return HttpResponse::InternalServerError().body("Database connection error"),
    };

    let changes = body.into_inner();
    if changes.name.is_none() && changes.enabled.is_none() && changes.definition.is_none() {
        return HttpResponse::BadRequest().body("No fields to update");
    }

    if let Some(definition) = &changes.definition {
        if let Err(e) = models::validate_automation_definition(&mut conn, definition) {
            return HttpResponse::BadRequest().body(e.to_string());
        }
    }

    let automation_id = path.into_inner();
    match diesel::update(automations::table.find(automation_id))
        .set((&changes, automations::updated_at.eq(diesel::dsl::now.nullable())))
        .execute(&mut conn)
    {
        Ok(0) => return HttpResponse::NotFound().body("Automation not found"),
        Ok(_) => {}
        Err(_) => return HttpResponse::InternalServerError().body("Error updating automation"),
    }

    engine.invalidate_names().await;

    match automations::table
        .find(automation_id)
        .select(Automation::as_select())
        .first(&mut conn)
    {
        Ok(automation) => HttpResponse::Ok().json(automation),
        Err(_) => HttpResponse::InternalServerError().body("Error fetching automation"),
    }
}

/// Delete an automation
#[delete("/{automation_id}")]
pub async fn delete_automation(
    pool: web::Data<DbPool>,
    engine: web::Data<Engine>,
    path: web::Path<i32>,
) -> impl Responder {
    let mut conn = match pool.get() {
        Ok(c) => c,
        Err(_) => return HttpResponse::InternalServerError().body("Database connection error"),
    };

    match diesel::delete(automations::table.find(path.into_inner())).execute(&mut conn) {
        Ok(0) => HttpResponse::NotFound().body("Automation not found"),
        Ok(_) => {
            engine.invalidate_names().await;
            HttpResponse::NoContent().finish()
        }
        Err(_) => HttpResponse::InternalServerError().body("Error deleting automation"),
    }
}
