//! User-facing messages and generation prompts.
//!
//! The service talks to Brazilian Portuguese speakers, so every text the user
//! sees lives here instead of being scattered across the state machine.

use serde::Deserialize;

use super::model::QUESTION_COUNT;

pub const ONBOARDING: &str = "\
Olá! 👋 Sou o Darwin, seu assistente de entrevistas.

Para começarmos, me envie seu contexto em uma única mensagem:
- A vaga para a qual você está aplicando.
- Seu nível de experiência.
- As tecnologias que você domina.";

pub const ASK_CONTEXT: &str = "Por favor, envie seu contexto por texto ou áudio para começarmos.";

pub const CONTEXT_RECEIVED: &str = "\
Recebi seu contexto! 👍 Preparando 3 perguntas personalizadas...

Me avise com *'Estou pronto'* ou *'Estou pronta'* quando quiser que eu envie a primeira pergunta.

Para uma melhor experiência, responda usando *áudios* 🎤.";

pub const STILL_PREPARING_EMPTY: &str = "Estou preparando 3 perguntas... Quando estiver pronto, me avise!";

pub const ALMOST_READY: &str =
    "Quase lá! Estou finalizando suas perguntas personalizadas... Mais alguns segundos! ⏰";

pub const CONTEXT_UPDATED: &str = "\
Recebi sua atualização! 👍

Quando estiver pronto para começar, envie 'Estou pronto' ou 'Estou pronta'.";

pub const STILL_PREPARING: &str = "\
Estou preparando 3 perguntas personalizadas...

Quando estiver pronto para começar, envie 'Estou pronto' ou 'Estou pronta'.";

pub const ANSWER_REQUIRED: &str = "Por favor, responda à pergunta anterior para continuarmos.";

pub const FIRST_QUESTION_ON_ITS_WAY: &str = "Suas perguntas ficaram prontas! Segue a primeira. 👇";

pub const ANSWERS_RECEIVED: &str = "\
Excelente! Recebi todas as suas respostas. ✅ Estou preparando um feedback curto e direto.

Assim que estiver pronto para receber seu feedback, me avise com *'Pode enviar'*.";

pub const STILL_GENERATING_FEEDBACK: &str = "Estou finalizando seu feedback. Já te envio em instantes... 📊";

pub const PRO_OFFER: &str = "\
Muito obrigado pelo seu feedback! 🙏

🚀 *VERSÃO PRO EM DESENVOLVIMENTO* 🚀

Estamos criando uma versão PRO com *análise de vídeo* para avaliar sua comunicação não-verbal, \
postura e confiança durante as entrevistas!

Para ser o *primeiro a saber* e ganhar um *desconto especial de lançamento*, envie seu e-mail abaixo.

Caso não tenha interesse, digite *'finalizar'*.";

pub const PRO_DECLINED: &str =
    "Sem problemas! Obrigado por usar nosso bot. Para uma nova simulação, digite 'reiniciar'. 🚀";

pub const EMAIL_INVALID: &str = "\
O formato do email não parece estar correto. 😅

Pode tentar novamente? (Ex: seuemail@dominio.com)

Ou digite 'finalizar' se não quiser cadastrar.";

pub const CORRUPTED_STATE: &str =
    "Me perdi aqui. Vamos recomeçar para garantir que tudo corra bem.";

pub const GENERATION_FAILED: &str =
    "Não consegui gerar as perguntas com base no seu contexto. Poderia tentar descrevê-lo de outra forma?";

pub const GENERATION_DISPATCH_FAILED: &str = "Erro ao iniciar geração de perguntas. Tente novamente.";

pub const FEEDBACK_INCOMPLETE: &str = "Dados da entrevista estavam incompletos.";

pub const FEEDBACK_FAILED: &str = "Erro técnico ao gerar feedback.";

pub const FEEDBACK_DISPATCH_FAILED: &str = "Erro ao iniciar a geração do feedback.";

pub const SERVICE_UNAVAILABLE: &str =
    "Desculpe, tive um problema técnico agora. Tente novamente em instantes. 🙏";

pub const AUDIO_RECEIVED: &str = "Recebi seu áudio, um momento enquanto o transcrevo... 🎙️";

pub const AUDIO_NOT_UNDERSTOOD: &str =
    "Não consegui entender seu áudio. Por favor, tente falar mais claramente ou envie uma mensagem de texto.";

pub const AUDIO_NOT_PROCESSED: &str = "Não consegui processar seu áudio. Por favor, tente novamente.";

/// Question `number` (1-based) as shown to the user.
pub fn question_message(number: usize, question: &str) -> String {
    format!("*Pergunta {number}:*\n{question}")
}

pub fn missing_question(number: usize) -> String {
    let ordinal = match number {
        2 => "Segunda",
        3 => "Terceira",
        _ => "Primeira",
    };
    format!("Erro: {ordinal} pergunta não encontrada. Digite 'reiniciar' para começar novamente.")
}

pub fn feedback_failed(reason: &str) -> String {
    format!(
        "Houve um problema ao gerar seu feedback: {reason} Digite 'reiniciar' para começar uma nova entrevista."
    )
}

pub fn email_saved(email: &str) -> String {
    format!(
        "Perfeito! ✅ Seu email *{email}* foi salvo na nossa lista de espera.\n\n\
         Você receberá em primeira mão as novidades e um desconto especial de lançamento.\n\n\
         Para uma nova simulação, digite 'reiniciar'. Obrigado! 🎉"
    )
}

// ── Generation prompts ──────────────────────────────────────────────

/// Prompt for the question-generation job.
pub fn questions_prompt(context: &str) -> String {
    format!(
        "Você é um recrutador técnico sênior. Baseado no seguinte contexto de um candidato: '{context}'.\n\
         Gere exatamente 3 perguntas de entrevista (2 de soft skill e 1 de hard skill) no formato JSON:\n\
         {{\"perguntas\": [\"pergunta1\", \"pergunta2\", \"pergunta3\"]}}\n\
         Responda apenas com o JSON."
    )
}

/// Prompt for the feedback job. Callers guarantee three questions and answers.
pub fn feedback_prompt(context: &str, questions: &[String], answers: &[String]) -> String {
    let interview: String = questions
        .iter()
        .zip(answers)
        .enumerate()
        .map(|(i, (q, a))| format!("{}. {q}\n   → {a}\n", i + 1))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Você é um coach de carreira especialista em recrutamento.\n\n\
         **IMPORTANTE: Sua resposta deve ter NO MÁXIMO 1200 caracteres total.**\n\n\
         Analise a entrevista e forneça feedback CONCISO e realista para cada resposta:\n\n\
         Contexto: {context}\n\n\
         Entrevista:\n{interview}\n\
         Para cada resposta: clareza% + 1 ponto forte + 1 melhoria (máximo 2 linhas cada).\n\
         Use *negrito* e emojis, mas poucos.\n\
         Termine pedindo, com educação, um feedback sobre a experiência \
         (exemplo: Espero que este feedback tenha ajudado!🙏 Sua opinião é ouro para nós. O que você achou da experiência?).\n\n\
         LIMITE: 1200 caracteres no total."
    )
}

#[derive(Debug, Deserialize)]
struct QuestionsPayload {
    perguntas: Vec<String>,
}

/// Parse the model's reply to [`questions_prompt`].
///
/// Accepts the JSON object optionally wrapped in a Markdown code fence.
/// Anything other than exactly three non-empty questions is an error.
pub fn parse_questions(raw: &str) -> Result<Vec<String>, String> {
    let cleaned = raw.trim().replace("```json", "").replace("```", "");
    let payload: QuestionsPayload = serde_json::from_str(cleaned.trim())
        .map_err(|e| format!("reply is not the expected JSON object: {e}"))?;

    let questions: Vec<String> = payload
        .perguntas
        .into_iter()
        .map(|q| q.trim().to_string())
        .collect();

    if questions.len() != QUESTION_COUNT {
        return Err(format!("expected {QUESTION_COUNT} questions, got {}", questions.len()));
    }
    if questions.iter().any(String::is_empty) {
        return Err("reply contains an empty question".to_string());
    }
    Ok(questions)
}
