use actix_web::web;

pub mod actions;
pub mod automations;
pub mod devices;
pub mod execute;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/devices")
            .service(devices::list_devices)
            .service(devices::get_device)
            .service(devices::create_device)
            .service(devices::update_device)
            .service(devices::delete_device),
    )
    .service(
        web::scope("/api/actions")
            .service(actions::list_actions)
            .service(actions::get_action)
            .service(actions::create_action)
            .service(actions::update_action)
            .service(actions::delete_action),
    )
    .service(
        web::scope("/api/automations")
            .service(automations::list_automations)
            .service(automations::get_automation)
            .service(automations::create_automation)
            .service(automations::update_automation)
            .service(automations::delete_automation),
    )
    .service(execute::execute);
}
