//! Master dictionary of the 43 PGDAS-D activity ids as published by SERPRO.

/// Canonical description of each activity id; index 0 is id 1.
pub(crate) const DESCRIPTIONS: [&str; 43] = [
    // Anexo I: comércio
    "Sem substituição tributária/tributação monofásica/antecipação com encerramento de tributação (o substituto tributário do ICMS deve utilizar essa opção)",
    "Com substituição tributária/tributação monofásica/antecipação com encerramento de tributação (o substituído tributário do ICMS deve utilizar essa opção)",
    "Revenda de mercadorias para o exterior",
    // Anexo II: indústria
    "Sem substituição tributária/tributação monofásica/antecipação com encerramento de tributação (o substituto tributário do ICMS deve utilizar essa opção)",
    "Com substituição tributária/tributação monofásica/antecipação com encerramento de tributação (o substituído tributário do ICMS deve utilizar essa opção)",
    "Venda de mercadorias industrializadas pelo contribuinte para o exterior",
    // locação de bens móveis
    "Locação de bens móveis, exceto para o exterior",
    "Locação de bens móveis para o exterior",
    "Escritórios de serviços contábeis autorizados pela legislação municipal a pagar o ISS em valor fixo em guia do Município",
    // Anexos III e V: fator r
    "Sujeitos ao fator “r”, sem retenção/substituição tributária de ISS, com ISS devido a outro(s) Município(s)",
    "Sujeitos ao fator “r”, sem retenção/substituição tributária de ISS, com ISS devido ao próprio Município do estabelecimento",
    "Sujeitos ao fator “r”, com retenção/substituição tributária de ISS",
    "Não sujeitos ao fator “r” e tributados pelo Anexo III, sem retenção/substituição tributária de ISS, com ISS devido a outro(s) Município(s)",
    "Não sujeitos ao fator “r” e tributados pelo Anexo III, sem retenção/substituição tributária de ISS, com ISS devido ao próprio Município do estabelecimento",
    "Não sujeitos ao fator “r” e tributados pelo Anexo III, com retenção/substituição tributária de ISS",
    // Anexo IV
    "Sujeitos ao Anexo IV, sem retenção/substituição tributária de ISS, com ISS devido a outro(s) Município(s)",
    "Sujeitos ao Anexo IV, sem retenção/substituição tributária de ISS, com ISS devido ao próprio Município do estabelecimento",
    "Sujeitos ao Anexo IV, com retenção/substituição tributária de ISS",
    // construção civil
    "Serviços da área da construção civil relacionados nos subitens 7.02 e 7.05 da LC 116/2003, Anexo III, sem retenção, ISS devido a outro(s) Município(s)",
    "Serviços da área da construção civil relacionados nos subitens 7.02 e 7.05 da LC 116/2003, Anexo III, sem retenção, ISS devido ao próprio Município",
    "Serviços da área da construção civil relacionados nos subitens 7.02 e 7.05 da LC 116/2003, Anexo III, com retenção",
    "Serviços da área da construção civil relacionados nos subitens 7.02 e 7.05 da LC 116/2003, Anexo IV, sem retenção, ISS devido a outro(s) Município(s)",
    "Serviços da área da construção civil relacionados nos subitens 7.02 e 7.05 da LC 116/2003, Anexo IV, sem retenção, ISS devido ao próprio Município",
    "Serviços da área da construção civil relacionados nos subitens 7.02 e 7.05 da LC 116/2003, Anexo IV, com retenção",
    // transporte coletivo municipal
    "Serviços de transporte coletivo municipal rodoviário, metroviário, ferroviário e aquaviário de passageiros, sem retenção/substituição tributária de ISS, com ISS devido a outro(s) Município(s)",
    "Serviços de transporte coletivo municipal rodoviário, metroviário, ferroviário e aquaviário de passageiros, sem retenção/substituição tributária de ISS, com ISS devido ao próprio Município do estabelecimento",
    "Serviços de transporte coletivo municipal rodoviário, metroviário, ferroviário e aquaviário de passageiros, com retenção/substituição tributária de ISS",
    // prestação de serviços para o exterior
    "Escritórios de serviços contábeis autorizados pela legislação municipal a pagar o ISS em valor fixo em guia do Município",
    "Sujeitos ao fator “r”",
    "Não sujeitos ao fator “r” e tributados pelo Anexo III",
    "Sujeitos ao Anexo IV",
    "Serviços da área da construção civil relacionados nos subitens 7.02 e 7.05 da lista anexa à LC 116/2003 e tributados pelo Anexo III",
    "Serviços da área da construção civil relacionados nos subitens 7.02 e 7.05 da lista anexa à LC 116/2003 e tributados pelo Anexo IV",
    // transporte e comunicação (ICMS)
    "Transporte sem substituição tributária de ICMS (o substituto tributário deve utilizar essa opção)",
    "Transporte com substituição tributária de ICMS (o substituído tributário deve utilizar essa opção)",
    "Comunicação sem substituição tributária de ICMS (o substituto tributário deve utilizar essa opção)",
    "Comunicação com substituição tributária de ICMS (o substituído tributário deve utilizar essa opção)",
    "Transporte para o exterior",
    "Comunicação para o exterior",
    // demais serviços com ISS
    "Sem retenção/substituição tributária de ISS, com ISS devido a outro(s) Município(s)",
    "Sem retenção/substituição tributária de ISS, com ISS devido ao próprio Município do estabelecimento",
    "Com retenção/substituição tributária de ISS",
    "Atividades com incidência simultânea de IPI e de ISS para o exterior",
];

/// Ids whose revenue is declared as export (`receitaPaCompetenciaExterno`).
pub const EXPORT_CODES: [u8; 8] = [29, 30, 31, 32, 33, 38, 39, 43];

/// Annex III ids subject to the fator r test, which require payroll history.
pub const FATOR_R_CODES: [u8; 3] = [10, 11, 12];
