use anyhow::Result;
use std::sync::Arc;
use tempfile::TempDir;
use teloxide::types::ChatId;

use order_intake::bot::ui_builder::{
    customer_keyboard, main_keyboard, manager_keyboard, LABEL_BACK, LABEL_CHECK_ORDERS,
    LABEL_ENTER_USER, LABEL_LAUNCH_APP, LABEL_LOGIN_CUSTOMER, LABEL_LOGIN_MANAGER, LABEL_LOGOUT,
    LABEL_ORDER_INFO, LABEL_SHOW_USERS, LABEL_START,
};
use order_intake::bot::{BotReply, ChatEvent, ConversationMachine, KeyboardSpec};
use order_intake::dialogue::{ConversationState, PendingInput};
use order_intake::localization::t_lang;
use order_intake::manager_registry::ManagerRegistry;
use order_intake::order_model::{Customer, Order};
use order_intake::persistence::{OrderOrigin, OrderStore};
use order_intake::users::UserStore;

const WEB_APP_URL: &str = "https://quaxww.github.io/";

struct Fixture {
    dir: TempDir,
    machine: ConversationMachine,
    users: Arc<UserStore>,
    orders: Arc<OrderStore>,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let registry = ManagerRegistry::load_shared(dir.path().join("managers.json"));
    let users = Arc::new(UserStore::load(dir.path().join("users.json")));
    let orders = Arc::new(OrderStore::open(dir.path().join("orders")).expect("Failed to open store"));
    let machine = ConversationMachine::new(registry, users.clone(), orders.clone(), WEB_APP_URL);
    Fixture {
        dir,
        machine,
        users,
        orders,
    }
}

async fn send(machine: &ConversationMachine, chat: i64, text: &str) -> Result<BotReply> {
    machine
        .handle(&ChatEvent::new(ChatId(chat), text).with_sender("Ivan"))
        .await
}

async fn login_manager(machine: &ConversationMachine, chat: i64) -> Result<()> {
    send(machine, chat, LABEL_LOGIN_MANAGER).await?;
    send(machine, chat, "1234567890").await?;
    assert_eq!(machine.state(ChatId(chat)).await?, ConversationState::ManagerAuthenticated);
    Ok(())
}

#[tokio::test]
async fn test_unseen_chat_starts_at_start() -> Result<()> {
    let f = fixture();
    assert_eq!(f.machine.state(ChatId(42)).await?, ConversationState::Start);

    let reply = send(&f.machine, 42, "hello").await?;
    assert_eq!(reply.keyboard, main_keyboard());
    assert_eq!(f.machine.state(ChatId(42)).await?, ConversationState::Start);
    Ok(())
}

#[tokio::test]
async fn test_manager_login_scenario() -> Result<()> {
    let f = fixture();

    let reply = send(&f.machine, 1, LABEL_START).await?;
    let rows = reply.keyboard.button_rows().expect("role keyboard expected");
    let options: Vec<&String> = rows.iter().flatten().collect();
    assert_eq!(options.len(), 2);
    assert!(options.iter().any(|label| *label == LABEL_LOGIN_MANAGER));
    assert_eq!(f.machine.state(ChatId(1)).await?, ConversationState::Start);

    let reply = send(&f.machine, 1, LABEL_LOGIN_MANAGER).await?;
    assert_eq!(reply.keyboard, KeyboardSpec::Remove);
    assert_eq!(
        f.machine.state(ChatId(1)).await?,
        ConversationState::WaitingForManagerCode
    );

    let reply = send(&f.machine, 1, "1234567890").await?;
    assert_eq!(reply.keyboard, manager_keyboard());
    assert_eq!(reply.text, t_lang("manager-code-accepted", None));
    assert_eq!(
        f.machine.state(ChatId(1)).await?,
        ConversationState::ManagerAuthenticated
    );
    Ok(())
}

#[tokio::test]
async fn test_wrong_manager_code_resets_to_start() -> Result<()> {
    let f = fixture();
    send(&f.machine, 1, LABEL_LOGIN_MANAGER).await?;

    let reply = send(&f.machine, 1, "0000000000").await?;
    assert_eq!(reply.text, t_lang("manager-code-rejected", None));
    assert_eq!(reply.keyboard, main_keyboard());
    assert_eq!(f.machine.state(ChatId(1)).await?, ConversationState::Start);
    Ok(())
}

#[tokio::test]
async fn test_user_entry_flow() -> Result<()> {
    let f = fixture();
    login_manager(&f.machine, 7).await?;

    let reply = send(&f.machine, 7, LABEL_ENTER_USER).await?;
    assert_eq!(reply.keyboard, KeyboardSpec::Remove);
    assert_eq!(f.machine.state(ChatId(7)).await?, ConversationState::WaitingForFullName);

    // Blank names are re-prompted
    let reply = send(&f.machine, 7, "   ").await?;
    assert_eq!(reply.text, t_lang("user-name-empty", None));
    assert_eq!(f.machine.state(ChatId(7)).await?, ConversationState::WaitingForFullName);

    send(&f.machine, 7, "Иванов Иван Иванович").await?;
    let expected_waiting = ConversationState::WaitingForBirthDate {
        pending: PendingInput {
            full_name: "Иванов Иван Иванович".to_string(),
        },
    };
    assert_eq!(f.machine.state(ChatId(7)).await?, expected_waiting);

    // Unparseable and future dates keep the pending name
    let reply = send(&f.machine, 7, "вчера").await?;
    assert_eq!(reply.text, t_lang("birth-date-invalid", None));
    assert_eq!(f.machine.state(ChatId(7)).await?, expected_waiting);

    let reply = send(&f.machine, 7, "01.01.2999").await?;
    assert_eq!(reply.text, t_lang("birth-date-future", None));
    assert_eq!(f.machine.state(ChatId(7)).await?, expected_waiting);
    assert!(f.users.is_empty());

    let reply = send(&f.machine, 7, "15.05.1990").await?;
    assert_eq!(reply.keyboard, manager_keyboard());
    assert!(reply.text.contains("Иванов Иван Иванович"));
    assert!(reply.text.contains("15.05.1990"));
    assert_eq!(
        f.machine.state(ChatId(7)).await?,
        ConversationState::ManagerAuthenticated
    );

    assert_eq!(f.users.len(), 1);
    assert_eq!(UserStore::load(f.dir.path().join("users.json")).len(), 1);

    let reply = send(&f.machine, 7, LABEL_SHOW_USERS).await?;
    assert!(reply.text.contains("Иванов Иван Иванович"));
    assert!(reply.text.contains("🎂 15.05.1990"));
    Ok(())
}

#[tokio::test]
async fn test_empty_user_list() -> Result<()> {
    let f = fixture();
    login_manager(&f.machine, 3).await?;

    let reply = send(&f.machine, 3, LABEL_SHOW_USERS).await?;
    assert_eq!(reply.text, t_lang("users-empty", None));
    assert_eq!(reply.keyboard, manager_keyboard());
    Ok(())
}

#[tokio::test]
async fn test_order_summary() -> Result<()> {
    let f = fixture();
    login_manager(&f.machine, 5).await?;

    let reply = send(&f.machine, 5, LABEL_CHECK_ORDERS).await?;
    assert_eq!(reply.text, t_lang("orders-empty", None));

    let mut order = Order::for_customer(Customer::new("Сидоров", "+7", "", "", "Тула"));
    order.total_amount = rust_decimal::Decimal::new(150_050, 2);
    f.orders.save(&order, OrderOrigin::WebForm)?;

    let reply = send(&f.machine, 5, LABEL_CHECK_ORDERS).await?;
    assert!(reply.text.contains("Сидоров"));
    assert!(reply.text.contains("1500.50"));
    assert!(reply.text.contains("#1"));
    Ok(())
}

#[tokio::test]
async fn test_manager_logout() -> Result<()> {
    let f = fixture();
    login_manager(&f.machine, 9).await?;

    let reply = send(&f.machine, 9, "что-то непонятное").await?;
    assert_eq!(reply.text, t_lang("manager-hint", None));
    assert_eq!(reply.keyboard, manager_keyboard());

    let reply = send(&f.machine, 9, LABEL_LOGOUT).await?;
    assert_eq!(reply.keyboard, main_keyboard());
    assert_eq!(f.machine.state(ChatId(9)).await?, ConversationState::Start);
    Ok(())
}

#[tokio::test]
async fn test_customer_mode() -> Result<()> {
    let f = fixture();

    let reply = send(&f.machine, 2, LABEL_LOGIN_CUSTOMER).await?;
    assert_eq!(reply.keyboard, customer_keyboard());
    assert_eq!(f.machine.state(ChatId(2)).await?, ConversationState::CustomerMode);

    let reply = send(&f.machine, 2, LABEL_ORDER_INFO).await?;
    assert_eq!(reply.text, t_lang("customer-order-info", None));

    let reply = send(&f.machine, 2, LABEL_LAUNCH_APP).await?;
    match reply.keyboard {
        KeyboardSpec::WebApp { url, .. } => assert_eq!(url, WEB_APP_URL),
        other => panic!("Expected web app button, got {other:?}"),
    }
    assert_eq!(f.machine.state(ChatId(2)).await?, ConversationState::CustomerMode);

    let reply = send(&f.machine, 2, "привет").await?;
    assert_eq!(reply.text, t_lang("customer-hint", None));

    let reply = send(&f.machine, 2, LABEL_BACK).await?;
    assert_eq!(reply.keyboard, main_keyboard());
    assert_eq!(f.machine.state(ChatId(2)).await?, ConversationState::Start);
    Ok(())
}

#[tokio::test]
async fn test_add_manager_command() -> Result<()> {
    let f = fixture();

    let reply = send(&f.machine, 1, "/addmanager").await?;
    assert_eq!(reply.text, t_lang("addmanager-usage", None));

    let reply = send(&f.machine, 1, "/addmanager 12345").await?;
    assert_eq!(reply.text, t_lang("addmanager-invalid", None));

    let reply = send(&f.machine, 1, "/addmanager 5555555555").await?;
    assert!(reply.text.contains("5555555555"));
    assert_ne!(reply.text, t_lang("addmanager-failed", None));

    let again = send(&f.machine, 1, "/AddManager 5555555555").await?;
    assert_ne!(again.text, reply.text);
    assert!(again.text.contains("5555555555"));

    // Commands never move the chat out of its state
    assert_eq!(f.machine.state(ChatId(1)).await?, ConversationState::Start);

    // The new code unlocks the manager branch and survives a reload
    send(&f.machine, 2, LABEL_LOGIN_MANAGER).await?;
    send(&f.machine, 2, "5555555555").await?;
    assert_eq!(
        f.machine.state(ChatId(2)).await?,
        ConversationState::ManagerAuthenticated
    );
    let reloaded = ManagerRegistry::load(f.dir.path().join("managers.json"));
    assert!(reloaded.contains("5555555555"));
    Ok(())
}

#[tokio::test]
async fn test_help_depends_on_state() -> Result<()> {
    let f = fixture();

    let reply = send(&f.machine, 1, "/help").await?;
    assert_eq!(reply.text, t_lang("help-general", None));

    send(&f.machine, 1, LABEL_LOGIN_CUSTOMER).await?;
    let reply = send(&f.machine, 1, "/help").await?;
    assert_eq!(reply.text, t_lang("help-customer", None));

    login_manager(&f.machine, 2).await?;
    let reply = send(&f.machine, 2, "/help").await?;
    assert_eq!(reply.text, t_lang("help-manager", None));
    Ok(())
}

#[tokio::test]
async fn test_start_command_resets_state() -> Result<()> {
    let f = fixture();
    login_manager(&f.machine, 4).await?;
    send(&f.machine, 4, LABEL_ENTER_USER).await?;

    let reply = send(&f.machine, 4, "/start").await?;
    assert_eq!(reply.keyboard, main_keyboard());
    assert_eq!(f.machine.state(ChatId(4)).await?, ConversationState::Start);
    Ok(())
}

#[tokio::test]
async fn test_other_commands() -> Result<()> {
    let f = fixture();

    let reply = send(&f.machine, 1, "/test").await?;
    assert_eq!(reply.text, t_lang("command-test", None));

    let reply = send(&f.machine, 1, "/run").await?;
    assert!(matches!(reply.keyboard, KeyboardSpec::WebApp { .. }));

    let reply = send(&f.machine, 1, "/unknown").await?;
    assert_eq!(reply.text, t_lang("command-unknown", None));
    Ok(())
}

#[tokio::test]
async fn test_chats_are_independent() -> Result<()> {
    let f = fixture();
    login_manager(&f.machine, 10).await?;
    send(&f.machine, 11, LABEL_LOGIN_CUSTOMER).await?;

    assert_eq!(
        f.machine.state(ChatId(10)).await?,
        ConversationState::ManagerAuthenticated
    );
    assert_eq!(f.machine.state(ChatId(11)).await?, ConversationState::CustomerMode);
    assert_eq!(f.machine.state(ChatId(12)).await?, ConversationState::Start);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_same_chat_events_are_serialized() -> Result<()> {
    let f = fixture();
    login_manager(&f.machine, 9).await?;
    send(&f.machine, 9, LABEL_ENTER_USER).await?;

    let (first, second) = tokio::join!(
        send(&f.machine, 9, "Сидоров Сидор"),
        send(&f.machine, 9, "Кузнецова Анна"),
    );
    let mut replies = vec![first?.text, second?.text];
    replies.sort();
    let mut expected = vec![
        t_lang("birth-date-prompt", None),
        t_lang("birth-date-invalid", None),
    ];
    expected.sort();
    assert_eq!(replies, expected);

    match f.machine.state(ChatId(9)).await? {
        ConversationState::WaitingForBirthDate { pending } => {
            assert!(["Сидоров Сидор", "Кузнецова Анна"].contains(&pending.full_name.as_str()));
        }
        other => panic!("unexpected state {other:?}"),
    }
    assert_eq!(f.machine.active_chats(), 0);
    Ok(())
}

#[tokio::test]
async fn test_sender_name_is_escaped() -> Result<()> {
    let f = fixture();
    let event = ChatEvent::new(ChatId(1), "hi").with_sender("<b>Eve</b>");

    let reply = f.machine.handle(&event).await?;
    assert!(reply.text.contains("&lt;b&gt;Eve&lt;/b&gt;"));
    assert!(!reply.text.contains("<b>Eve"));
    Ok(())
}

#[tokio::test]
async fn test_english_replies() -> Result<()> {
    let f = fixture();
    let event = ChatEvent::new(ChatId(1), "/test").with_language("en-US");

    let reply = f.machine.handle(&event).await?;
    assert_eq!(reply.text, t_lang("command-test", Some("en")));
    assert_ne!(reply.text, t_lang("command-test", None));
    Ok(())
}
