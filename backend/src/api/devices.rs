use crate::{
    db::DbPool,
    models::{self, Device, NewDevice, UpdateDevice},
    schema::devices,
    services::Engine,
};
use actix_web::{delete, get, post, put, web, HttpResponse, Responder};
use diesel::prelude::*;

/// List all devices
#[get("")]
pub async fn list_devices(pool: web::Data<DbPool>) -> impl Responder {
    let mut conn = match pool.get() {
        Ok(c) => c,
        Err(_) => return HttpResponse::InternalServerError().body("Database connection error"),
    };

    match devices::table.select(Device::as_select()).load(&mut conn) {
        Ok(list) => HttpResponse::Ok().json(list),
        Err(_) => HttpResponse::InternalServerError().body("Error fetching devices"),
    }
}

/// Get a single device by ID
#[get("/{device_id}")]
pub async fn get_device(pool: web::Data<DbPool>, path: web::Path<i32>) -> impl Responder {
    let mut conn = match pool.get() {
        Ok(c) => c,
        Err(_) => return HttpResponse::InternalServerError().body("Database connection error"),
    };

    match devices::table
        .find(path.into_inner())
        .select(Device::as_select())
        .first(&mut conn)
        .optional()
    {
        Ok(Some(device)) => HttpResponse::Ok().json(device),
        Ok(None) => HttpResponse::NotFound().body("Device not found"),
        Err(_) => HttpResponse::InternalServerError().body("Error fetching device"),
    }
}

/// Register a new device
#[post("")]
pub async fn create_device(
    pool: web::Data<DbPool>,
    engine: web::Data<Engine>,
    body: web::Json<NewDevice>,
) -> impl Responder {
    let mut conn = match pool.get() {
        Ok(c) => c,
        Err(_) => return HttpResponse::InternalServerError().body("Database connection error"),
    };

    let new_device = body.into_inner();
    if let Err(e) = models::validate_device_actions(&mut conn, &new_device.actions) {
        return HttpResponse::BadRequest().body(e.to_string());
    }

    let created: Device = match diesel::insert_into(devices::table)
        .values(&new_device)
        .returning(Device::as_returning())
        .get_result(&mut conn)
    {
        Ok(d) => d,
        Err(diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _,
        )) => return HttpResponse::BadRequest().body("Device name already exists"),
        Err(_) => return HttpResponse::InternalServerError().body("Error creating device"),
    };

    engine.invalidate_names().await;
    HttpResponse::Created().json(created)
}

/// Update an existing device
#[put("/{device_id}")]
pub async fn update_device(
    pool: web::Data<DbPool>,
    engine: web::Data<Engine>,
    path: web::Path<i32>,
    body: web::Json<UpdateDevice>,
) -> impl Responder {
    let mut conn = match pool.get() {
        Ok(c) => c,
        Err(_) => return HttpResponse::InternalServerError().body("Database connection error"),
    };

    let changes = body.into_inner();
    if changes.name.is_none()
        && changes.type_.is_none()
        && changes.chip.is_none()
        && changes.board.is_none()
        && changes.ip.is_none()
        && changes.actions.is_none()
    {
        return HttpResponse::BadRequest().body("No fields to update");
    }

    if let Some(actions) = &changes.actions {
        if let Err(e) = models::validate_device_actions(&mut conn, actions) {
            return HttpResponse::BadRequest().body(e.to_string());
        }
    }

    let device_id = path.into_inner();
    match diesel::update(devices::table.find(device_id))
        .set((&changes, devices::updated_at.eq(diesel::dsl::now.nullable())))
        .execute(&mut conn)
    {
        Ok(0) => return HttpResponse::NotFound().body("Device not found"),
        Ok(_) => {}
        Err(_) => return HttpResponse::InternalServerError().body("Error updating device"),
    }

    engine.invalidate_names().await;

    match devices::table
        .find(device_id)
        .select(Device::as_select())
        .first(&mut conn)
    {
        Ok(device) => HttpResponse::Ok().json(device),
        Err(_) => HttpResponse::InternalServerError().body("Error fetching device"),
    }
}

/// Delete a device
#[delete("/{device_id}")]
pub async fn delete_device(
    pool: web::Data<DbPool>,
    engine: web::Data<Engine>,
    path: web::Path<i32>,
) -> impl Responder {
    let mut conn = match pool.get() {
        Ok(c) => c,
        Err(_) => return HttpResponse::InternalServerError().body("Database connection error"),
    };

    match diesel::delete(devices::table.find(path.into_inner())).execute(&mut conn) {
        Ok(0) => HttpResponse::NotFound().body("Device not found"),
        Ok(_) => {
            engine.invalidate_names().await;
            HttpResponse::NoContent().finish()
        }
        Err(_) => HttpResponse::InternalServerError().body("Error deleting device"),
    }
}
