use crate::{
    db::DbPool,
    models::{self, Action, NewAction, UpdateAction},
    schema::actions,
    services::Engine,
};
use actix_web::{delete, get, post, put, web, HttpResponse, Responder};
use diesel::prelude::*;

/// List all actions
#[get("")]
pub async fn list_actions(pool: web::Data<DbPool>) -> impl Responder {
    let mut conn = match pool.get() {
        Ok(c) => c,
        Err(_) => return HttpResponse::InternalServerError().body("Database connection error"),
    };

    match actions::table.select(Action::as_select()).load(&mut conn) {
        Ok(list) => HttpResponse::Ok().json(list),
        Err(_) => HttpResponse::InternalServerError().body("Error fetching actions"),
    }
}

/// Get a single action by ID
#[get("/{action_id}")]
pub async fn get_action(pool: web::Data<DbPool>, path: web::Path<i32>) -> impl Responder {
    let mut conn = match pool.get() {
        Ok(c) => c,
        Err(_) => return HttpResponse::InternalServerError().body("Database connection error"),
    };

    match actions::table
        .find(path.into_inner())
        .select(Action::as_select())
        .first(&mut conn)
        .optional()
    {
        Ok(Some(action)) => HttpResponse::Ok().json(action),
        Ok(None) => HttpResponse::NotFound().body("Action not found"),
        Err(_) => HttpResponse::InternalServerError().body("Error fetching action"),
    }
}

/// Register a new action
#[post("")]
pub async fn create_action(
    pool: web::Data<DbPool>,
    engine: web::Data<Engine>,
    body: web::Json<NewAction>,
) -> impl Responder {
    let mut conn = match pool.get() {
        Ok(c) => c,
        Err(_) => return HttpResponse::InternalServerError().body("Database connection error"),
    };

    let new_action = body.into_inner();
    if let Err(e) = models::validate_action_params(&new_action.params) {
        return HttpResponse::BadRequest().body(e.to_string());
    }

    let created: Action = match diesel::insert_into(actions::table)
        .values(&new_action)
        .returning(Action::as_returning())
        .get_result(&mut conn)
    {
        Ok(a) => a,
        Err(diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _,
        )) => return HttpResponse::BadRequest().body("Action name already exists"),
        Err(_) => return HttpResponse::InternalServerError().body("Error creating action"),
    };

    engine.invalidate_names().await;
    HttpResponse::Created().json(created)
}

/// Update an existing action
#[put("/{action_id}")]
pub async fn update_action(
    pool: web::Data<DbPool>,
    engine: web::Data<Engine>,
    path: web::Path<i32>,
    body: web::Json<UpdateAction>,
) -> impl Responder {
    let mut conn = match pool.get() {
        Ok(c) => c,
        Err(_) => return HttpResponse::InternalServerError().body("Database connection error"),
    };

    let changes = body.into_inner();
    if changes.name.is_none() && changes.path.is_none() && changes.params.is_none() {
        return HttpResponse::BadRequest().body("No fields to update");
    }

    if let Some(params) = &changes.params {
        if let Err(e) = models::validate_action_params(params) {
            return HttpResponse::BadRequest().body(e.to_string());
        }
    }

    let action_id = path.into_inner();
    match diesel::update(actions::table.find(action_id))
        .set(&changes)
        .execute(&mut conn)
    {
        Ok(0) => return HttpResponse::NotFound().body("Action not found"),
        Ok(_) => {}
        Err(_) => return HttpResponse::InternalServerError().body("Error updating action"),
    }

    engine.invalidate_names().await;

    match actions::table
        .find(action_id)
        .select(Action::as_select())
        .first(&mut conn)
    {
        Ok(action) => HttpResponse::Ok().json(action),
        Err(_) => HttpResponse::InternalServerError().body("Error fetching action"),
    }
}

/// Delete an action
#[delete("/{action_id}")]
pub async fn delete_action(
    pool: web::Data<DbPool>,
    engine: web::Data<Engine>,
    path: web::Path<i32>,
) -> impl Responder {
    let mut conn = match pool.get() {
        Ok(c) => c,
        Err(_) => return HttpResponse::InternalServerError().body("Database connection error"),
    };

    match diesel::delete(actions::table.find(path.into_inner())).execute(&mut conn) {
        Ok(0) => HttpResponse::NotFound().body("Action not found"),
        Ok(_) => {
            engine.invalidate_names().await;
            HttpResponse::NoContent().finish()
        }
        Err(_) => HttpResponse::InternalServerError().body("Error deleting action"),
    }
}
